//! Helios Document Store
//!
//! This crate provides a provider-agnostic document store: one API for
//! creating, reading, replacing, updating and deleting documents, with the
//! storage engine behind it chosen at runtime.
//!
//! # Features
//!
//! - **Batched Actions**: Ordered action lists that stop at the first failure
//! - **Optimistic Concurrency**: Revision checks on every write
//! - **Portable Codec**: Any serde type encodes to a backend-neutral [`Value`]
//! - **Conformance Suite**: One harness every backend must pass
//!
//! # Backend Features
//!
//! Enable backends with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! helios-docstore = { version = "0.1", features = ["sqlite"] }
//! ```
//!
//! Available backend features:
//! - `sqlite` (default) - SQLite with in-memory and file modes
//!
//! The in-memory backend is always available.
//!
//! # Architecture
//!
//! - [`document`] - Documents, keys, field paths and the [`Value`] model
//! - [`codec`] - Encoding between Rust types and [`Value`]
//! - [`core`] - The collection API, driver contract and revisions
//! - [`backends`] - Backend implementations
//! - [`conformance`] - Conformance tests for drivers and codecs
//! - [`context`] - Cancellation and deadlines
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use helios_docstore::backends::memory::MemoryBackend;
//! use helios_docstore::{Backend, CollectionConfig, Context, ErrorKind, Mods, document};
//! use helios_docstore::document::Document;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let backend = MemoryBackend::new();
//! let ctx = Context::background();
//! let players = backend
//!     .open_collection(&ctx, &CollectionConfig::new("players"))
//!     .await
//!     .unwrap();
//!
//! // Create assigns a revision
//! let mut alice = document! { "_id" => "alice", "score" => 10 };
//! players.create(&ctx, &mut alice).await.unwrap();
//! let stale = alice.clone();
//!
//! players
//!     .update(&ctx, &mut alice, Mods::new().set("score", 11))
//!     .await
//!     .unwrap();
//!
//! // Writing with an outdated revision fails
//! let mut stale = stale;
//! let err = players.put(&ctx, &mut stale).await.unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
//!
//! let mut read = Document::with_key("_id", "alice");
//! players.get(&ctx, &mut read).await.unwrap();
//! assert_eq!(read.get_field("score").unwrap(), Some(&11.into()));
//! # });
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod codec;
pub mod config;
pub mod conformance;
pub mod context;
pub mod core;
pub mod document;
pub mod error;

// Re-export commonly used types at crate root
pub use config::CollectionConfig;
pub use context::Context;
pub use document::{Document, DocumentKey, Value};
pub use error::{ActionListError, DocstoreError, DocstoreResult, ErrorKind};

// Re-export core traits
pub use crate::core::{ActionList, Backend, BackendKind, Collection, Driver, Mods};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
