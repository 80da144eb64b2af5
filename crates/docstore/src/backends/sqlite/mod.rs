//! SQLite backend implementation.
//!
//! Documents are stored as JSON text, one row per document, with the
//! revision in its own integer column. Revisions come from a per-collection
//! counter that never goes backwards, so a revision is never reused even
//! after a document is deleted and created again.
//!
//! # Example
//!
//! ```no_run
//! use helios_docstore::backends::sqlite::SqliteBackend;
//! use helios_docstore::{Backend, CollectionConfig, Context};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::open("./data/docs.db")?;
//! backend.init_schema()?;
//!
//! let ctx = Context::background();
//! let players = backend
//!     .open_collection(&ctx, &CollectionConfig::new("players"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE collections (
//!     name TEXT PRIMARY KEY,
//!     key_field TEXT NOT NULL,
//!     revision_field TEXT NOT NULL,
//!     last_revision INTEGER NOT NULL DEFAULT 0,
//!     created_at TEXT NOT NULL
//! );
//!
//! CREATE TABLE documents (
//!     collection TEXT NOT NULL,
//!     doc_key TEXT NOT NULL,     -- JSON-encoded key
//!     revision INTEGER NOT NULL,
//!     data TEXT NOT NULL,        -- JSON document
//!     updated_at TEXT NOT NULL,
//!     PRIMARY KEY (collection, doc_key)
//! );
//! ```
//!
//! # Native encoding
//!
//! Times are stored as `{"$date": <milliseconds>}` and byte strings as
//! `{"$binary": "<base64>"}`; sub-millisecond precision is lost. A user
//! map with a single `$`-prefixed key is stored as `{"$map": {...}}` so it
//! cannot be mistaken for either wrapper.

mod backend;
mod codec;
mod collection;
mod schema;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use codec::{SqliteCodecTester, json_to_value, value_to_json};
pub use collection::SqliteCollection;
pub use schema::SCHEMA_VERSION;
