//! Driver for one SQLite collection.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::config::CollectionConfig;
use crate::context::Context;
use crate::core::revision::{
    CounterRevisions, RevisionSource, check_precondition, expected_revision,
};
use crate::core::{Action, ActionKind, Driver, apply_mods};
use crate::document::{DocumentKey, Value, project};
use crate::error::{CodecError, DocstoreError, DocstoreResult};

use super::backend::BACKEND_NAME;
use super::codec::{json_to_value, value_to_json};

/// A collection stored in the `documents` table.
pub struct SqliteCollection {
    pool: Pool<SqliteConnectionManager>,
    name: String,
    key_field: String,
    revision_field: String,
}

impl Debug for SqliteCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteCollection")
            .field("name", &self.name)
            .field("key_field", &self.key_field)
            .field("revision_field", &self.revision_field)
            .finish_non_exhaustive()
    }
}

struct StoredRow {
    revision: i64,
    data: String,
}

impl SqliteCollection {
    pub(crate) fn new(pool: Pool<SqliteConnectionManager>, config: &CollectionConfig) -> Self {
        Self {
            pool,
            name: config.name.clone(),
            key_field: config.key_field.clone(),
            revision_field: config.revision_field.clone(),
        }
    }

    fn read_row(&self, conn: &Connection, doc_key: &str) -> DocstoreResult<Option<StoredRow>> {
        Ok(conn
            .query_row(
                "SELECT revision, data FROM documents WHERE collection = ?1 AND doc_key = ?2",
                params![self.name, doc_key],
                |row| {
                    Ok(StoredRow {
                        revision: row.get(0)?,
                        data: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    /// Advances the collection's revision counter and returns the new value.
    fn next_revision(&self, conn: &Connection) -> DocstoreResult<Value> {
        let last: i64 = conn.query_row(
            "SELECT last_revision FROM collections WHERE name = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        let next = CounterRevisions.next_revision(Some(&Value::Int(last))).into_value();
        conn.execute(
            "UPDATE collections SET last_revision = ?1 WHERE name = ?2",
            params![next.as_i64(), self.name],
        )?;
        Ok(next)
    }

    fn get(
        &self,
        conn: &Connection,
        key: &DocumentKey,
        doc_key: &str,
        action: &mut Action<'_>,
    ) -> DocstoreResult<()> {
        let row = self
            .read_row(conn, doc_key)?
            .ok_or_else(|| DocstoreError::not_found(&self.name, key))?;
        let fields = decode_fields(&row.data)?;
        let fields = if action.field_paths().is_empty() {
            fields
        } else {
            project(&fields, action.field_paths())
        };
        action.document_mut().load(
            fields,
            &self.key_field,
            &self.revision_field,
            Value::Int(row.revision),
        );
        Ok(())
    }

    fn write(
        &self,
        ctx: &Context,
        conn: &mut Connection,
        key: &DocumentKey,
        doc_key: &str,
        action: &mut Action<'_>,
    ) -> DocstoreResult<()> {
        let expected = expected_revision(action.document(), &self.revision_field).cloned();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = self.read_row(&tx, doc_key)?;
        let current_revision = current.as_ref().map(|row| Value::Int(row.revision));
        let check = |stored: Option<&Value>| {
            check_precondition(&self.name, key, stored, expected.as_ref(), |a, b| {
                self.revisions_match(a, b)
            })
        };

        let fields = match action.kind() {
            ActionKind::Create => {
                if current.is_some() {
                    return Err(DocstoreError::already_exists(&self.name, key));
                }
                action.document().storable_fields(&self.revision_field)
            }
            ActionKind::Put => {
                check(current_revision.as_ref())?;
                action.document().storable_fields(&self.revision_field)
            }
            ActionKind::Replace => {
                if current.is_none() {
                    return Err(DocstoreError::not_found(&self.name, key));
                }
                check(current_revision.as_ref())?;
                action.document().storable_fields(&self.revision_field)
            }
            ActionKind::Update => {
                let row = current
                    .as_ref()
                    .ok_or_else(|| DocstoreError::not_found(&self.name, key))?;
                check(current_revision.as_ref())?;
                let mut fields = decode_fields(&row.data)?;
                apply_mods(&mut fields, action.mods())?;
                fields
            }
            ActionKind::Delete => {
                if expected.is_some() {
                    check(current_revision.as_ref())?;
                }
                tx.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND doc_key = ?2",
                    params![self.name, doc_key],
                )?;
                ctx.check()?;
                tx.commit()?;
                return Ok(());
            }
            ActionKind::Get => {
                return Err(DocstoreError::internal(BACKEND_NAME, "get is not a write"));
            }
        };

        let data = serde_json::to_string(&value_to_json(&Value::Map(fields))?)?;
        let revision = self.next_revision(&tx)?;
        tx.execute(
            "INSERT INTO documents (collection, doc_key, revision, data, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(collection, doc_key) DO UPDATE SET
                revision = excluded.revision,
                data = excluded.data,
                updated_at = excluded.updated_at",
            params![
                self.name,
                doc_key,
                revision.as_i64(),
                data,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;

        // A context canceled mid-write rolls the transaction back.
        ctx.check()?;
        tx.commit()?;

        action
            .document_mut()
            .set_revision(&self.revision_field, revision);
        Ok(())
    }
}

fn decode_fields(data: &str) -> DocstoreResult<BTreeMap<String, Value>> {
    let json: serde_json::Value = serde_json::from_str(data)?;
    match json_to_value(&json)? {
        Value::Map(fields) => Ok(fields),
        other => Err(CodecError::Unrepresentable {
            expected: "document".to_string(),
            found: other.type_name().to_string(),
        }
        .into()),
    }
}

#[async_trait]
impl Driver for SqliteCollection {
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

    /// Revisions are integers; a revision of any other type never matches.
    fn revisions_match(&self, stored: &Value, expected: &Value) -> bool {
        matches!((stored, expected), (Value::Int(a), Value::Int(b)) if a == b)
    }

    async fn run_action(&self, ctx: &Context, action: &mut Action<'_>) -> DocstoreResult<()> {
        ctx.check()?;
        let key = self.key(action.document())?;
        let doc_key = serde_json::to_string(&key)?;
        tracing::debug!(
            collection = %self.name,
            key = %key,
            kind = %action.kind(),
            "sqlite action"
        );

        let mut conn = self.pool.get()?;
        match action.kind() {
            ActionKind::Get => self.get(&conn, &key, &doc_key, action),
            _ => self.write(ctx, &mut conn, &key, &doc_key, action),
        }
    }
}
