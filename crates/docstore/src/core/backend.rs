//! Backend abstraction.

use std::fmt::{self, Debug};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CollectionConfig;
use crate::context::Context;
use crate::error::DocstoreResult;

use super::{Collection, Driver};

/// Identifies the type of backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process maps, for tests and ephemeral data.
    Memory,
    /// SQLite database (file or in-memory).
    Sqlite,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// A database that can open collections.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    fn kind(&self) -> BackendKind;

    /// Short identifier used in errors and logs.
    fn name(&self) -> &'static str;

    /// Opens, creating if needed, the collection described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the collection cannot be reached or
    /// created, and a validation error for an invalid config.
    async fn make_collection(
        &self,
        ctx: &Context,
        config: &CollectionConfig,
    ) -> DocstoreResult<Box<dyn Driver>>;

    /// Opens a collection wrapped in the public API.
    async fn open_collection(
        &self,
        ctx: &Context,
        config: &CollectionConfig,
    ) -> DocstoreResult<Collection> {
        let driver = self.make_collection(ctx, config).await?;
        Ok(Collection::new(driver))
    }

    /// Checks that the backend is reachable.
    async fn health_check(&self) -> DocstoreResult<()>;
}
