//! In-memory backend.
//!
//! Documents live in ordered maps shared by every handle the backend opens,
//! so two collections opened with the same name see the same data. Each
//! write stores a random etag as the new revision, which means a deleted
//! and re-created document never matches a revision read before the delete.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::CollectionConfig;
use crate::context::Context;
use crate::core::revision::{RevisionSource, UuidRevisions, check_precondition, expected_revision};
use crate::core::{Action, ActionKind, Backend, BackendKind, Driver, apply_mods};
use crate::document::{DocumentKey, Value, project};
use crate::error::{DocstoreError, DocstoreResult};

const BACKEND_NAME: &str = "memory";

#[derive(Debug, Clone)]
struct StoredDocument {
    fields: BTreeMap<String, Value>,
    revision: Value,
}

type Store = Arc<RwLock<BTreeMap<DocumentKey, StoredDocument>>>;

/// Backend keeping every collection in process memory.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    collections: Arc<RwLock<HashMap<String, Store>>>,
}

impl Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("collections", &self.collections.read().len())
            .finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents stored in `collection`.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|store| store.read().len())
            .unwrap_or(0)
    }

    fn store(&self, name: &str) -> Store {
        if let Some(store) = self.collections.read().get(name) {
            return store.clone();
        }
        self.collections
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn make_collection(
        &self,
        ctx: &Context,
        config: &CollectionConfig,
    ) -> DocstoreResult<Box<dyn Driver>> {
        ctx.check()?;
        config.validate()?;
        tracing::info!(collection = %config.name, "opening memory collection");
        Ok(Box::new(MemoryCollection {
            name: config.name.clone(),
            key_field: config.key_field.clone(),
            revision_field: config.revision_field.clone(),
            store: self.store(&config.name),
            revisions: UuidRevisions::new(),
        }))
    }

    async fn health_check(&self) -> DocstoreResult<()> {
        Ok(())
    }
}

/// One collection of a [`MemoryBackend`].
pub struct MemoryCollection {
    name: String,
    key_field: String,
    revision_field: String,
    store: Store,
    revisions: UuidRevisions,
}

impl Debug for MemoryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("name", &self.name)
            .field("key_field", &self.key_field)
            .field("revision_field", &self.revision_field)
            .finish_non_exhaustive()
    }
}

impl MemoryCollection {
    fn check(
        &self,
        key: &DocumentKey,
        stored: Option<&Value>,
        expected: Option<&Value>,
    ) -> DocstoreResult<()> {
        check_precondition(&self.name, key, stored, expected, |a, b| {
            self.revisions_match(a, b)
        })
    }
}

#[async_trait]
impl Driver for MemoryCollection {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn collection_name(&self) -> &str {
        &self.name
    }

    fn key_field(&self) -> &str {
        &self.key_field
    }

    fn revision_field(&self) -> &str {
        &self.revision_field
    }

    async fn run_action(&self, ctx: &Context, action: &mut Action<'_>) -> DocstoreResult<()> {
        ctx.check()?;
        let key = self.key(action.document())?;
        let expected = expected_revision(action.document(), &self.revision_field).cloned();
        tracing::debug!(
            collection = %self.name,
            key = %key,
            kind = %action.kind(),
            "memory action"
        );

        let mut store = self.store.write();
        let current = store.get(&key).map(|d| d.revision.clone());

        match action.kind() {
            ActionKind::Get => {
                let stored = store
                    .get(&key)
                    .ok_or_else(|| DocstoreError::not_found(&self.name, &key))?;
                let fields = if action.field_paths().is_empty() {
                    stored.fields.clone()
                } else {
                    project(&stored.fields, action.field_paths())
                };
                let revision = stored.revision.clone();
                action
                    .document_mut()
                    .load(fields, &self.key_field, &self.revision_field, revision);
                return Ok(());
            }
            ActionKind::Delete => {
                if expected.is_some() {
                    self.check(&key, current.as_ref(), expected.as_ref())?;
                }
                store.remove(&key);
                return Ok(());
            }
            ActionKind::Create => {
                if current.is_some() {
                    return Err(DocstoreError::already_exists(&self.name, &key));
                }
            }
            ActionKind::Replace | ActionKind::Update => {
                if current.is_none() {
                    return Err(DocstoreError::not_found(&self.name, &key));
                }
                self.check(&key, current.as_ref(), expected.as_ref())?;
            }
            ActionKind::Put => {
                self.check(&key, current.as_ref(), expected.as_ref())?;
            }
        }

        let fields = match action.kind() {
            ActionKind::Update => {
                let mut fields = store
                    .get(&key)
                    .map(|d| d.fields.clone())
                    .unwrap_or_default();
                apply_mods(&mut fields, action.mods())?;
                fields
            }
            _ => action.document().storable_fields(&self.revision_field),
        };
        let revision = self.revisions.next_revision(current.as_ref()).into_value();
        store.insert(
            key,
            StoredDocument {
                fields,
                revision: revision.clone(),
            },
        );
        drop(store);

        action
            .document_mut()
            .set_revision(&self.revision_field, revision);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Mods;
    use crate::document;
    use crate::document::Document;
    use crate::error::ErrorKind;

    const REV: &str = "DocstoreRevision";

    async fn open(backend: &MemoryBackend, name: &str) -> crate::core::Collection {
        backend
            .open_collection(&Context::background(), &CollectionConfig::new(name))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let backend = MemoryBackend::new();
        let coll = open(&backend, "docs").await;
        let ctx = Context::background();

        let mut doc = document! { "_id" => "a", "n" => 1, "s" => "x" };
        coll.put(&ctx, &mut doc).await.unwrap();
        let rev = doc.revision(REV).cloned().unwrap();

        let mut got = Document::with_key("_id", "a");
        coll.get(&ctx, &mut got).await.unwrap();
        assert_eq!(got, doc);
        assert_eq!(got.revision(REV), Some(&rev));
        assert_eq!(backend.document_count("docs"), 1);
    }

    #[tokio::test]
    async fn test_handles_share_storage() {
        let backend = MemoryBackend::new();
        let first = open(&backend, "shared").await;
        let second = open(&backend, "shared").await;
        let other = open(&backend, "other").await;
        let ctx = Context::background();

        let mut doc = document! { "_id" => 7 };
        first.create(&ctx, &mut doc).await.unwrap();

        let mut got = Document::with_key("_id", 7);
        second.get(&ctx, &mut got).await.unwrap();
        let mut missing = Document::with_key("_id", 7);
        assert_eq!(
            other.get(&ctx, &mut missing).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_every_write_changes_revision() {
        let backend = MemoryBackend::new();
        let coll = open(&backend, "docs").await;
        let ctx = Context::background();

        let mut doc = document! { "_id" => "a" };
        coll.create(&ctx, &mut doc).await.unwrap();
        let r1 = doc.revision(REV).cloned().unwrap();
        coll.put(&ctx, &mut doc).await.unwrap();
        let r2 = doc.revision(REV).cloned().unwrap();
        coll.update(&ctx, &mut doc, Mods::new()).await.unwrap();
        let r3 = doc.revision(REV).cloned().unwrap();

        assert_ne!(r1, r2);
        assert_ne!(r2, r3);
    }

    #[tokio::test]
    async fn test_recreated_document_rejects_old_revision() {
        let backend = MemoryBackend::new();
        let coll = open(&backend, "docs").await;
        let ctx = Context::background();

        let mut doc = document! { "_id" => "a" };
        coll.create(&ctx, &mut doc).await.unwrap();
        let stale = doc.clone();

        let mut plain = document! { "_id" => "a" };
        coll.delete(&ctx, &mut plain).await.unwrap();
        let mut plain = document! { "_id" => "a" };
        coll.create(&ctx, &mut plain).await.unwrap();

        let mut stale = stale;
        let err = coll.replace(&ctx, &mut stale).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    }

    #[tokio::test]
    async fn test_update_does_not_touch_other_fields() {
        let backend = MemoryBackend::new();
        let coll = open(&backend, "docs").await;
        let ctx = Context::background();

        let mut doc = document! { "_id" => "a", "keep" => true, "nested" => document_map() };
        coll.put(&ctx, &mut doc).await.unwrap();
        coll.update(&ctx, &mut doc, Mods::new().set("nested.y", 2).unset("nested.x"))
            .await
            .unwrap();

        let mut got = Document::with_key("_id", "a");
        coll.get(&ctx, &mut got).await.unwrap();
        assert_eq!(got.get_field("keep").unwrap(), Some(&Value::Bool(true)));
        assert_eq!(got.get_field("nested.y").unwrap(), Some(&Value::Int(2)));
        assert_eq!(got.get_field("nested.x").unwrap(), None);
    }

    fn document_map() -> Value {
        let mut m = BTreeMap::new();
        m.insert("x".to_string(), Value::Int(1));
        Value::Map(m)
    }

    #[tokio::test]
    async fn test_get_projection() {
        let backend = MemoryBackend::new();
        let coll = open(&backend, "docs").await;
        let ctx = Context::background();

        let mut doc = document! { "_id" => "a", "x" => 1, "y" => 2 };
        coll.put(&ctx, &mut doc).await.unwrap();

        let mut got = Document::with_key("_id", "a");
        coll.get_fields(&ctx, &mut got, &["y"]).await.unwrap();
        assert_eq!(got.get_field("x").unwrap(), None);
        assert_eq!(got.get_field("y").unwrap(), Some(&Value::Int(2)));
        assert_eq!(got.revision(REV), doc.revision(REV));
    }

    #[tokio::test]
    async fn test_health_check_and_kind() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.kind(), BackendKind::Memory);
        assert!(backend.health_check().await.is_ok());
        let err = backend
            .make_collection(&Context::background(), &CollectionConfig::new(""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
