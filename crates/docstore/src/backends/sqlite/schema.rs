//! SQLite schema definitions and migrations.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{DocstoreError, DocstoreResult};

use super::backend::BACKEND_NAME;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> DocstoreResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        tracing::debug!(version = SCHEMA_VERSION, "created sqlite schema");
    } else if current_version > SCHEMA_VERSION {
        return Err(DocstoreError::internal(
            BACKEND_NAME,
            format!(
                "database schema version {} is newer than supported version {}",
                current_version, SCHEMA_VERSION
            ),
        ));
    }

    Ok(())
}

/// Get the current schema version, 0 for a fresh database.
fn get_schema_version(conn: &Connection) -> DocstoreResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| schema_error("Failed to create schema_version table", e))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> DocstoreResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| schema_error("Failed to clear schema_version", e))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| schema_error("Failed to set schema_version", e))?;
    Ok(())
}

fn create_schema_v1(conn: &Connection) -> DocstoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            key_field TEXT NOT NULL,
            revision_field TEXT NOT NULL,
            last_revision INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            doc_key TEXT NOT NULL,
            revision INTEGER NOT NULL,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (collection, doc_key)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_updated
            ON documents(collection, updated_at);",
    )
    .map_err(|e| schema_error("Failed to create documents schema", e))
}

fn schema_error(context: &str, e: rusqlite::Error) -> DocstoreError {
    DocstoreError::internal(BACKEND_NAME, format!("{}: {}", context, e))
}
