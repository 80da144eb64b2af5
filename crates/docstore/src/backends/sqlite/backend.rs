//! SQLite backend and its configuration.

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::config::CollectionConfig;
use crate::context::Context;
use crate::core::{Backend, BackendKind, Driver};
use crate::error::{BackendError, DocstoreError, DocstoreResult, ValidationError};

use super::collection::SqliteCollection;
use super::schema;

pub(crate) const BACKEND_NAME: &str = "sqlite";

/// SQLite backend for document storage.
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
///
/// ```
/// use helios_docstore::backends::sqlite::SqliteBackendConfig;
/// use std::time::Duration;
///
/// let config: SqliteBackendConfig =
///     serde_json::from_str(r#"{"busy_timeout": "250ms"}"#).unwrap();
/// assert_eq!(config.busy_timeout, Duration::from_millis(250));
/// assert_eq!(config.max_connections, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool. In-memory databases
    /// always use a single connection.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection.
    #[serde(with = "humantime_serde", default = "default_connection_timeout")]
    pub connection_timeout: Duration,

    /// How long SQLite retries a locked database before failing.
    #[serde(with = "humantime_serde", default = "default_busy_timeout")]
    pub busy_timeout: Duration,

    /// Enable WAL mode for file databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
            busy_timeout: default_busy_timeout(),
            enable_wal: true,
        }
    }
}

impl SqliteBackendConfig {
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_connection_timeout(mut self, connection_timeout: Duration) -> Self {
        self.connection_timeout = connection_timeout;
        self
    }

    pub fn with_wal(mut self, enable_wal: bool) -> Self {
        self.enable_wal = enable_wal;
        self
    }

    fn validate(&self) -> DocstoreResult<()> {
        if self.max_connections == 0 {
            return Err(ValidationError::InvalidConfig {
                message: "max_connections must be at least 1".to_string(),
            }
            .into());
        }
        if self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidConfig {
                message: format!(
                    "min_connections ({}) exceeds max_connections ({})",
                    self.min_connections, self.max_connections
                ),
            }
            .into());
        }
        Ok(())
    }
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    pub fn in_memory() -> DocstoreResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default())
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> DocstoreResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a backend with custom configuration and initializes its
    /// schema.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
    ) -> DocstoreResult<Self> {
        config.validate()?;
        let is_memory = path.as_ref().to_string_lossy() == ":memory:";

        let busy_timeout = config.busy_timeout;
        let manager = if is_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(path.as_ref())
        }
        .with_init(move |conn| conn.busy_timeout(busy_timeout));

        // Every connection to ":memory:" is its own database, so the pool
        // must hold exactly one connection and never recycle it.
        let builder = if is_memory {
            Pool::builder()
                .max_size(1)
                .min_idle(Some(1))
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            Pool::builder()
                .max_size(config.max_connections)
                .min_idle(Some(config.min_connections))
        };
        let pool = builder
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                DocstoreError::Backend(BackendError::ConnectionFailed {
                    backend_name: BACKEND_NAME.to_string(),
                    message: e.to_string(),
                })
            })?;

        let backend = Self {
            pool,
            config,
            is_memory,
        };
        backend.configure_connection()?;
        backend.init_schema()?;

        tracing::info!(
            path = %path.as_ref().display(),
            is_memory,
            "opened sqlite backend"
        );
        Ok(backend)
    }

    /// Initialize the database schema. Safe to call more than once.
    pub fn init_schema(&self) -> DocstoreResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> DocstoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn configure_connection(&self) -> DocstoreResult<()> {
        if self.config.enable_wal && !self.is_memory {
            let conn = self.get_connection()?;
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .map_err(|e| {
                    DocstoreError::internal(
                        BACKEND_NAME,
                        format!("Failed to enable WAL mode: {}", e),
                    )
                })?;
            tracing::debug!(journal_mode = %mode, "configured sqlite journal");
        }
        Ok(())
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Registers `config` in the collections table, or checks it against
    /// the registered fields.
    fn register_collection(&self, config: &CollectionConfig) -> DocstoreResult<()> {
        let conn = self.get_connection()?;
        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT key_field, revision_field FROM collections WHERE name = ?1",
                params![config.name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            None => {
                conn.execute(
                    "INSERT OR IGNORE INTO collections
                     (name, key_field, revision_field, last_revision, created_at)
                     VALUES (?1, ?2, ?3, 0, ?4)",
                    params![
                        config.name,
                        config.key_field,
                        config.revision_field,
                        chrono::Utc::now().to_rfc3339()
                    ],
                )?;
                Ok(())
            }
            Some((key_field, revision_field))
                if key_field == config.key_field && revision_field == config.revision_field =>
            {
                Ok(())
            }
            Some((key_field, revision_field)) => Err(BackendError::CollectionUnavailable {
                backend_name: BACKEND_NAME.to_string(),
                collection: config.name.clone(),
                message: format!(
                    "collection uses key field {:?} and revision field {:?}",
                    key_field, revision_field
                ),
            }
            .into()),
        }
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
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
        self.register_collection(config)?;
        tracing::info!(collection = %config.name, "opening sqlite collection");
        Ok(Box::new(SqliteCollection::new(self.pool.clone(), config)))
    }

    async fn health_check(&self) -> DocstoreResult<()> {
        let conn = self.get_connection().map_err(|_| BackendError::Unavailable {
            backend_name: BACKEND_NAME.to_string(),
            message: "Failed to get connection".to_string(),
        })?;
        conn.query_row("SELECT 1", [], |_| Ok(())).map_err(|e| {
            DocstoreError::internal(BACKEND_NAME, format!("Health check failed: {}", e))
        })?;
        Ok(())
    }
}

/// Serde module for Duration with humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_in_memory_backend() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(backend.is_memory());
        backend.init_schema().unwrap();
    }

    #[test]
    fn test_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");
        let backend = SqliteBackend::open(&path).unwrap();
        assert!(!backend.is_memory());
        assert!(path.exists());
    }

    #[test]
    fn test_config_round_trip() {
        let config = SqliteBackendConfig::default().with_busy_timeout(Duration::from_millis(1500));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("1s 500ms"));
        let parsed: SqliteBackendConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.busy_timeout, Duration::from_millis(1500));
        assert!(parsed.enable_wal);
    }

    #[test]
    fn test_config_rejects_bad_pool_sizes() {
        let config = SqliteBackendConfig::default().with_max_connections(0);
        let err = SqliteBackend::with_config(":memory:", config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(backend.health_check().await.is_ok());
        assert_eq!(backend.kind(), BackendKind::Sqlite);
        assert_eq!(backend.name(), "sqlite");
    }

    #[tokio::test]
    async fn test_collection_fields_must_match_registration() {
        let backend = SqliteBackend::in_memory().unwrap();
        let ctx = Context::background();
        backend
            .make_collection(&ctx, &CollectionConfig::new("docs"))
            .await
            .unwrap();
        backend
            .make_collection(&ctx, &CollectionConfig::new("docs"))
            .await
            .unwrap();

        let err = backend
            .make_collection(&ctx, &CollectionConfig::new("docs").with_key_field("name"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
