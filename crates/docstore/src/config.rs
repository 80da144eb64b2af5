//! Collection configuration.

use serde::{Deserialize, Serialize};

use crate::error::{DocstoreResult, ValidationError};

/// Default name of the key field.
pub const DEFAULT_KEY_FIELD: &str = "_id";

/// Default name of the revision field.
pub const DEFAULT_REVISION_FIELD: &str = "DocstoreRevision";

/// Settings for one collection handle.
///
/// ```
/// use helios_docstore::CollectionConfig;
///
/// let config: CollectionConfig = serde_json::from_str(r#"{"name": "players"}"#).unwrap();
/// assert_eq!(config.key_field, "_id");
/// assert_eq!(config.revision_field, "DocstoreRevision");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Name of the collection within its backend.
    pub name: String,

    /// Field holding each document's key.
    #[serde(default = "default_key_field")]
    pub key_field: String,

    /// Field holding each document's revision.
    #[serde(default = "default_revision_field")]
    pub revision_field: String,
}

fn default_key_field() -> String {
    DEFAULT_KEY_FIELD.to_string()
}

fn default_revision_field() -> String {
    DEFAULT_REVISION_FIELD.to_string()
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: default_key_field(),
            revision_field: default_revision_field(),
        }
    }

    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    pub fn with_revision_field(mut self, revision_field: impl Into<String>) -> Self {
        self.revision_field = revision_field.into();
        self
    }

    /// Checks that the field names are usable.
    pub fn validate(&self) -> DocstoreResult<()> {
        let invalid = |message: &str| -> DocstoreResult<()> {
            Err(ValidationError::InvalidConfig {
                message: format!("collection {:?}: {}", self.name, message),
            }
            .into())
        };
        if self.name.is_empty() {
            return invalid("name must not be empty");
        }
        if self.key_field.is_empty() || self.key_field.contains('.') {
            return invalid("key field must be a non-empty top-level name");
        }
        if self.revision_field.is_empty() || self.revision_field.contains('.') {
            return invalid("revision field must be a non-empty top-level name");
        }
        if self.key_field == self.revision_field {
            return invalid("key field and revision field must differ");
        }
        Ok(())
    }
}
