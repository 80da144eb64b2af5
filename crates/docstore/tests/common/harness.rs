//! Conformance harnesses for the bundled backends.

use async_trait::async_trait;
use helios_docstore::backends::memory::MemoryBackend;
use helios_docstore::conformance::{Harness, HarnessMaker};
use helios_docstore::{Backend, CollectionConfig, Context, DocstoreResult, Driver};

/// Name of the collection every harness hands out.
pub const TEST_COLLECTION: &str = "docstore-test";

/// Builds harnesses over a fresh [`MemoryBackend`].
#[derive(Debug, Default)]
pub struct MemoryHarnessMaker;

pub struct MemoryHarness {
    backend: MemoryBackend,
}

#[async_trait]
impl Harness for MemoryHarness {
    async fn make_collection(&self, ctx: &Context) -> DocstoreResult<Box<dyn Driver>> {
        self.backend
            .make_collection(ctx, &CollectionConfig::new(TEST_COLLECTION))
            .await
    }
}

#[async_trait]
impl HarnessMaker for MemoryHarnessMaker {
    async fn make_harness(&self, _ctx: &Context) -> DocstoreResult<Box<dyn Harness>> {
        Ok(Box::new(MemoryHarness {
            backend: MemoryBackend::new(),
        }))
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::*;

#[cfg(feature = "sqlite")]
mod sqlite {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use helios_docstore::backends::sqlite::SqliteBackend;

    /// Builds harnesses over a SQLite file in a fresh temporary directory.
    #[derive(Debug, Default)]
    pub struct SqliteHarnessMaker {
        made: AtomicUsize,
    }

    pub struct SqliteHarness {
        backend: SqliteBackend,
        collections: AtomicUsize,
        // Dropped last, removing the database file.
        _dir: tempfile::TempDir,
    }

    #[async_trait]
    impl Harness for SqliteHarness {
        async fn make_collection(&self, ctx: &Context) -> DocstoreResult<Box<dyn Driver>> {
            let n = self.collections.fetch_add(1, Ordering::SeqCst);
            let name = format!("{}-{}", TEST_COLLECTION, n);
            self.backend
                .make_collection(ctx, &CollectionConfig::new(name))
                .await
        }
    }

    #[async_trait]
    impl HarnessMaker for SqliteHarnessMaker {
        async fn make_harness(&self, _ctx: &Context) -> DocstoreResult<Box<dyn Harness>> {
            self.made.fetch_add(1, Ordering::SeqCst);
            let dir = tempfile::tempdir().map_err(|e| {
                helios_docstore::error::BackendError::Unavailable {
                    backend_name: "sqlite".to_string(),
                    message: e.to_string(),
                }
            })?;
            let backend = SqliteBackend::open(dir.path().join("conformance.db"))?;
            Ok(Box::new(SqliteHarness {
                backend,
                collections: AtomicUsize::new(0),
                _dir: dir,
            }))
        }
    }

    impl SqliteHarnessMaker {
        /// Number of harnesses built so far.
        pub fn harnesses_made(&self) -> usize {
            self.made.load(Ordering::SeqCst)
        }
    }
}

/// Opens a collection named `name` on a fresh in-memory backend.
pub async fn memory_collection(name: &str) -> helios_docstore::Collection {
    MemoryBackend::new()
        .open_collection(&Context::background(), &CollectionConfig::new(name))
        .await
        .expect("Failed to open memory collection")
}

/// Opens a collection named `name` on a fresh in-memory SQLite database.
#[cfg(feature = "sqlite")]
pub async fn sqlite_collection(name: &str) -> helios_docstore::Collection {
    helios_docstore::backends::sqlite::SqliteBackend::in_memory()
        .expect("Failed to create SQLite backend")
        .open_collection(&Context::background(), &CollectionConfig::new(name))
        .await
        .expect("Failed to open SQLite collection")
}

/// Generates one test per backend from an async function taking a
/// [`Collection`](helios_docstore::Collection).
#[macro_export]
macro_rules! backend_test {
    ($test_name:ident, $test_fn:path) => {
        paste::paste! {
            #[tokio::test]
            async fn [<memory_ $test_name>]() {
                $crate::common::init_tracing();
                let coll = $crate::common::memory_collection(stringify!($test_name)).await;
                $test_fn(coll).await;
            }

            #[cfg(feature = "sqlite")]
            #[tokio::test]
            async fn [<sqlite_ $test_name>]() {
                $crate::common::init_tracing();
                let coll = $crate::common::sqlite_collection(stringify!($test_name)).await;
                $test_fn(coll).await;
            }
        }
    };
}
