//! The public collection API and batch executor.

use std::sync::Arc;

use crate::context::Context;
use crate::document::{Document, DocumentKey, FieldPath};
use crate::error::{ActionListError, DocstoreError, DocstoreResult, ValidationError};

use super::revision::expected_revision;
use super::{Action, ActionKind, Driver, KeyGenerator, Mods};

/// A collection of documents in one backend.
///
/// Cheap to clone; clones share the driver and key generator.
#[derive(Debug, Clone)]
pub struct Collection {
    driver: Arc<dyn Driver>,
    keys: Arc<KeyGenerator>,
}

impl Collection {
    pub fn new(driver: Box<dyn Driver>) -> Self {
        Self::from_arc(Arc::from(driver))
    }

    pub fn from_arc(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            keys: Arc::new(KeyGenerator::new()),
        }
    }

    /// Replaces the generator used for keys of Create actions.
    pub fn with_key_generator(mut self, keys: KeyGenerator) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn name(&self) -> &str {
        self.driver.collection_name()
    }

    pub fn key_field(&self) -> &str {
        self.driver.key_field()
    }

    pub fn revision_field(&self) -> &str {
        self.driver.revision_field()
    }

    /// Starts a batch of actions.
    pub fn actions(&self) -> ActionList<'_> {
        ActionList {
            coll: self,
            actions: Vec::new(),
        }
    }

    /// Creates a new document. Fails with `AlreadyExists` if the key is
    /// taken; a missing key is generated and written back to `doc`.
    pub async fn create(&self, ctx: &Context, doc: &mut Document) -> DocstoreResult<()> {
        single(self.actions().create(doc).run(ctx).await)
    }

    /// Creates or fully replaces a document.
    pub async fn put(&self, ctx: &Context, doc: &mut Document) -> DocstoreResult<()> {
        single(self.actions().put(doc).run(ctx).await)
    }

    /// Fully replaces an existing document. Fails with `NotFound` if absent.
    pub async fn replace(&self, ctx: &Context, doc: &mut Document) -> DocstoreResult<()> {
        single(self.actions().replace(doc).run(ctx).await)
    }

    /// Fills `doc` with the stored document whose key it holds.
    pub async fn get(&self, ctx: &Context, doc: &mut Document) -> DocstoreResult<()> {
        single(self.actions().get(doc).run(ctx).await)
    }

    /// Like [`Collection::get`], but only loads the listed field paths.
    pub async fn get_fields(
        &self,
        ctx: &Context,
        doc: &mut Document,
        field_paths: &[&str],
    ) -> DocstoreResult<()> {
        single(
            self.actions()
                .get_fields(doc, field_paths.iter().copied())
                .run(ctx)
                .await,
        )
    }

    /// Deletes a document. Deleting a missing document without a revision
    /// succeeds.
    pub async fn delete(&self, ctx: &Context, doc: &mut Document) -> DocstoreResult<()> {
        single(self.actions().delete(doc).run(ctx).await)
    }

    /// Applies modifications to an existing document.
    pub async fn update(
        &self,
        ctx: &Context,
        doc: &mut Document,
        mods: Mods,
    ) -> DocstoreResult<()> {
        single(self.actions().update(doc, mods).run(ctx).await)
    }

    /// Releases the driver's resources.
    pub async fn close(&self) -> DocstoreResult<()> {
        self.driver.close().await
    }
}

fn single(result: Result<usize, ActionListError>) -> DocstoreResult<()> {
    result.map(|_| ()).map_err(ActionListError::into_inner)
}

#[derive(Debug)]
struct PendingAction<'a> {
    kind: ActionKind,
    doc: &'a mut Document,
    mods: Option<Mods>,
    field_paths: Vec<String>,
}

/// An ordered batch of actions on one collection.
///
/// Actions run in the order they were added; a Get after a Put of the same
/// key observes the Put. Execution stops at the first failure.
///
/// ```
/// # use helios_docstore::backends::memory::MemoryBackend;
/// # use helios_docstore::{Backend, CollectionConfig, Context, document};
/// # use helios_docstore::document::Document;
/// # tokio_test_block_on(async {
/// let backend = MemoryBackend::new();
/// let ctx = Context::background();
/// let coll = backend
///     .open_collection(&ctx, &CollectionConfig::new("players"))
///     .await?;
///
/// let mut alice = document! { "_id" => "alice", "score" => 10 };
/// let mut read_back = Document::with_key("_id", "alice");
/// let done = coll.actions().put(&mut alice).get(&mut read_back).run(&ctx).await?;
/// assert_eq!(done, 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct ActionList<'a> {
    coll: &'a Collection,
    actions: Vec<PendingAction<'a>>,
}

impl<'a> ActionList<'a> {
    fn push(mut self, kind: ActionKind, doc: &'a mut Document) -> Self {
        self.actions.push(PendingAction {
            kind,
            doc,
            mods: None,
            field_paths: Vec::new(),
        });
        self
    }

    pub fn create(self, doc: &'a mut Document) -> Self {
        self.push(ActionKind::Create, doc)
    }

    pub fn put(self, doc: &'a mut Document) -> Self {
        self.push(ActionKind::Put, doc)
    }

    pub fn replace(self, doc: &'a mut Document) -> Self {
        self.push(ActionKind::Replace, doc)
    }

    pub fn get(self, doc: &'a mut Document) -> Self {
        self.push(ActionKind::Get, doc)
    }

    /// A Get that only loads the listed field paths, plus key and revision.
    pub fn get_fields<I, S>(mut self, doc: &'a mut Document, field_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.push(PendingAction {
            kind: ActionKind::Get,
            doc,
            mods: None,
            field_paths: field_paths.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn delete(self, doc: &'a mut Document) -> Self {
        self.push(ActionKind::Delete, doc)
    }

    pub fn update(mut self, doc: &'a mut Document, mods: Mods) -> Self {
        self.actions.push(PendingAction {
            kind: ActionKind::Update,
            doc,
            mods: Some(mods),
            field_paths: Vec::new(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs the batch and returns the number of actions that succeeded.
    ///
    /// # Errors
    ///
    /// On failure the error carries the index of the failed action, which
    /// equals the number of actions that completed before it. Later actions
    /// are not attempted.
    pub async fn run(self, ctx: &Context) -> Result<usize, ActionListError> {
        let coll = self.coll;
        let total = self.actions.len();
        tracing::debug!(
            collection = coll.name(),
            backend = coll.driver.backend_name(),
            actions = total,
            "running action list"
        );

        let mut prepared = Vec::with_capacity(total);
        let mut invalid = None;
        for (index, pending) in self.actions.into_iter().enumerate() {
            match prepare(coll, pending) {
                Ok(action) => prepared.push(action),
                Err(e) => {
                    invalid = Some(ActionListError::new(index, e));
                    break;
                }
            }
        }

        // Valid actions before an invalid one still run, in order.
        if !prepared.is_empty() {
            if let Err(e) = coll.driver.run_actions(ctx, &mut prepared).await {
                tracing::debug!(
                    collection = coll.name(),
                    index = e.index,
                    kind = %e.kind(),
                    "action failed: {}",
                    e.source
                );
                return Err(e);
            }
        }

        match invalid {
            Some(e) => {
                tracing::debug!(
                    collection = coll.name(),
                    index = e.index,
                    "invalid action: {}",
                    e.source
                );
                Err(e)
            }
            None => Ok(prepared.len()),
        }
    }
}

/// Validates an action and fills in what the driver expects to be present.
fn prepare<'a>(coll: &Collection, pending: PendingAction<'a>) -> DocstoreResult<Action<'a>> {
    let PendingAction {
        kind,
        doc,
        mods,
        field_paths,
    } = pending;
    let driver = coll.driver();
    let key_field = driver.key_field();
    let revision_field = driver.revision_field();

    if kind == ActionKind::Create {
        if expected_revision(doc, revision_field).is_some() {
            return Err(ValidationError::RevisionOnCreate {
                key: doc.key(key_field).map(ToString::to_string).unwrap_or_default(),
            }
            .into());
        }
        match doc.key(key_field) {
            Some(key) => {
                DocumentKey::try_from(key)?;
            }
            None if driver.assigns_keys() => {}
            None => doc.set_field(key_field, coll.keys.new_key())?,
        }
    } else {
        let key = doc.key(key_field).ok_or_else(|| -> DocstoreError {
            ValidationError::MissingKey {
                action: kind.to_string(),
                key_field: key_field.to_string(),
            }
            .into()
        })?;
        DocumentKey::try_from(key)?;
    }

    let mods = match (kind, mods) {
        (ActionKind::Update, Some(mods)) => mods.validate(key_field, revision_field)?,
        _ => Vec::new(),
    };
    let field_paths = field_paths
        .iter()
        .map(|p| FieldPath::parse(p))
        .collect::<DocstoreResult<Vec<_>>>()?;

    Ok(Action::new(kind, doc, mods, field_paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use crate::config::CollectionConfig;
    use crate::core::Backend;
    use crate::document::Value;
    use crate::error::ErrorKind;

    const REV: &str = "DocstoreRevision";

    async fn collection() -> Collection {
        MemoryBackend::new()
            .open_collection(&Context::background(), &CollectionConfig::new("test"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_generates_key_from_seeded_generator() {
        let coll = collection().await.with_key_generator(KeyGenerator::seeded(1));
        let ctx = Context::background();

        let mut doc = crate::document! { "b" => false };
        coll.create(&ctx, &mut doc).await.unwrap();

        let expected = KeyGenerator::seeded(1).unique_string();
        assert_eq!(doc.key("_id"), Some(&Value::String(expected)));
        assert!(doc.revision(REV).is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_revision() {
        let coll = collection().await;
        let mut doc = crate::document! { "_id" => "k", REV => 1 };
        let err = coll.create(&Context::background(), &mut doc).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_missing_key_is_invalid() {
        let coll = collection().await;
        let mut doc = crate::document! { "a" => 1 };
        let err = coll.put(&Context::background(), &mut doc).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_invalid_action_stops_batch_after_earlier_actions_run() {
        let coll = collection().await;
        let ctx = Context::background();

        let mut first = crate::document! { "_id" => "first" };
        let mut keyless = crate::document! { "a" => 1 };
        let mut never = crate::document! { "_id" => "never" };
        let err = coll
            .actions()
            .put(&mut first)
            .replace(&mut keyless)
            .put(&mut never)
            .run(&ctx)
            .await
            .unwrap_err();

        assert_eq!(err.index, 1);
        assert_eq!(err.succeeded(), 1);
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let mut check = Document::with_key("_id", "first");
        coll.get(&ctx, &mut check).await.unwrap();
        let mut check = Document::with_key("_id", "never");
        let err = coll.get(&ctx, &mut check).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_backend_failure_reports_index() {
        let coll = collection().await;
        let ctx = Context::background();

        let mut a = crate::document! { "_id" => "a" };
        let mut missing = crate::document! { "_id" => "missing" };
        let mut b = crate::document! { "_id" => "b" };
        let err = coll
            .actions()
            .put(&mut a)
            .replace(&mut missing)
            .put(&mut b)
            .run(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut check = Document::with_key("_id", "b");
        assert!(coll.get(&ctx, &mut check).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let coll = collection().await;
        let list = coll.actions();
        assert!(list.is_empty());
        assert_eq!(list.run(&Context::background()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_canceled_context_runs_nothing() {
        let coll = collection().await;
        let ctx = Context::background();
        ctx.cancel();

        let mut doc = crate::document! { "_id" => "k" };
        let err = coll.put(&ctx, &mut doc).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);

        let mut check = Document::with_key("_id", "k");
        let err = coll
            .get(&Context::background(), &mut check)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_rejects_key_mod() {
        let coll = collection().await;
        let ctx = Context::background();
        let mut doc = crate::document! { "_id" => "k" };
        coll.put(&ctx, &mut doc).await.unwrap();
        let err = coll
            .update(&ctx, &mut doc, Mods::new().set("_id", "other"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
