//! The contract every backend collection implements.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::context::Context;
use crate::document::{Document, DocumentKey, Value};
use crate::error::{ActionListError, DocstoreResult};

use super::Action;

/// A backend-specific handle to one collection.
///
/// The executor hands drivers validated actions: keys are present (Create
/// keys are generated unless [`Driver::assigns_keys`]), mods are checked and
/// Get projections are parsed. A driver must:
///
/// - run actions in order, so later actions observe earlier writes;
/// - enforce the revision precondition atomically with each write;
/// - store a fresh revision on every successful write and copy it into the
///   action's document;
/// - fill in the document of a Get action, revision included.
///
/// # Example
///
/// ```ignore
/// #[async_trait]
/// impl Driver for MyCollection {
///     fn backend_name(&self) -> &'static str { "my-db" }
///     fn collection_name(&self) -> &str { &self.name }
///     fn key_field(&self) -> &str { "_id" }
///     fn revision_field(&self) -> &str { "DocstoreRevision" }
///
///     async fn run_action(&self, ctx: &Context, action: &mut Action<'_>) -> DocstoreResult<()> {
///         ctx.check()?;
///         // talk to the database
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// Short backend identifier used in errors and logs.
    fn backend_name(&self) -> &'static str;

    fn collection_name(&self) -> &str;

    fn key_field(&self) -> &str;

    fn revision_field(&self) -> &str;

    /// Whether the backend generates keys for Create actions without one.
    fn assigns_keys(&self) -> bool {
        false
    }

    /// Compares a stored revision with the one a caller presented.
    fn revisions_match(&self, stored: &Value, expected: &Value) -> bool {
        stored == expected
    }

    /// Extracts the document's key.
    fn key(&self, doc: &Document) -> DocstoreResult<DocumentKey> {
        DocumentKey::from_document(doc, self.key_field())
    }

    /// Runs one action.
    async fn run_action(&self, ctx: &Context, action: &mut Action<'_>) -> DocstoreResult<()>;

    /// Runs actions in order and stops at the first failure.
    ///
    /// The error's index is the position of the failed action. Drivers may
    /// override this to pipeline work as long as the ordering holds.
    async fn run_actions(
        &self,
        ctx: &Context,
        actions: &mut [Action<'_>],
    ) -> Result<(), ActionListError> {
        for (index, action) in actions.iter_mut().enumerate() {
            ctx.check().map_err(|e| ActionListError::new(index, e))?;
            self.run_action(ctx, action)
                .await
                .map_err(|e| ActionListError::new(index, e))?;
        }
        Ok(())
    }

    /// Releases backend resources held by the handle.
    async fn close(&self) -> DocstoreResult<()> {
        Ok(())
    }
}
