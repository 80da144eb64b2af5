//! Backend implementations.
//!
//! Each backend implements [`Backend`](crate::core::Backend) to open
//! collections and [`Driver`](crate::core::Driver) for the collections it
//! opens. Database backends are gated behind feature flags.
//!
//! # Available Backends
//!
//! | Backend | Feature | Revisions | Description |
//! |---------|---------|-----------|-------------|
//! | Memory | always | random etags | In-process maps for tests and ephemeral data |
//! | SQLite | `sqlite` | version counters | Embedded database, file or in-memory |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use helios_docstore::backends::sqlite::SqliteBackend;
//! use helios_docstore::backends::memory::MemoryBackend;
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scratch = MemoryBackend::new();
//!
//! // A file-based database
//! let backend = SqliteBackend::open("./data/docs.db")?;
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;
