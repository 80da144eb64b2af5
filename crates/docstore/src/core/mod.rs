//! Collection API, driver contract and revision handling.
//!
//! This module holds everything between the caller and a backend:
//!
//! - [`Collection`] - The public API for one collection
//! - [`ActionList`] - Ordered batches of actions with first-failure semantics
//! - [`Driver`] - What a backend implements for one collection
//! - [`Backend`] - A database that opens collections
//! - [`revision`] - The optimistic-concurrency precondition
//!
//! # Layering
//!
//! ```text
//! Collection / ActionList     validates actions, generates keys
//!         │
//!         ▼
//!   dyn Driver                runs actions against storage,
//!                             enforces revisions atomically
//! ```
//!
//! # Example: Implementing a Driver
//!
//! ```ignore
//! use async_trait::async_trait;
//! use helios_docstore::core::{Action, ActionKind, Driver};
//! use helios_docstore::{Context, DocstoreResult};
//!
//! #[derive(Debug)]
//! struct MyCollection {
//!     name: String,
//! }
//!
//! #[async_trait]
//! impl Driver for MyCollection {
//!     fn backend_name(&self) -> &'static str {
//!         "my-backend"
//!     }
//!
//!     fn collection_name(&self) -> &str {
//!         &self.name
//!     }
//!
//!     fn key_field(&self) -> &str {
//!         "_id"
//!     }
//!
//!     fn revision_field(&self) -> &str {
//!         "DocstoreRevision"
//!     }
//!
//!     async fn run_action(&self, ctx: &Context, action: &mut Action<'_>) -> DocstoreResult<()> {
//!         // Implementation...
//!         todo!()
//!     }
//! }
//! ```

pub mod action;
pub mod backend;
pub mod collection;
pub mod driver;
pub mod keygen;
pub mod revision;

pub use action::{Action, ActionKind, Mod, Mods, apply_mods};
pub use backend::{Backend, BackendKind};
pub use collection::{ActionList, Collection};
pub use driver::Driver;
pub use keygen::KeyGenerator;
pub use revision::{
    CounterRevisions, Revision, RevisionSource, UuidRevisions, check_precondition,
    expected_revision,
};
