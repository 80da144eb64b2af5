//! Error types for the document store.
//!
//! Errors are grouped by category the same way every backend reports them:
//! document state, concurrency, validation, encoding, caller context and
//! backend failures. Calling code branches on [`ErrorKind`] through
//! [`DocstoreError::kind`] rather than on concrete variants or messages.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// The primary error type for all document store operations.
#[derive(Error, Debug)]
pub enum DocstoreError {
    /// Document state errors
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Revision and concurrency errors
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Invalid actions, keys, field paths or mods
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Encoding and decoding errors
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Cancellation and deadline errors
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors related to the stored state of a document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// No document is stored under the key.
    #[error("document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    /// A document is already stored under the key.
    #[error("document already exists: {collection}/{key}")]
    AlreadyExists { collection: String, key: String },
}

/// Errors related to optimistic concurrency control.
#[derive(Error, Debug)]
pub enum ConcurrencyError {
    /// The stored revision differs from the one presented by the caller.
    #[error("revision mismatch for {collection}/{key}: expected {expected}, found {actual}")]
    RevisionMismatch {
        collection: String,
        key: String,
        expected: String,
        actual: String,
    },
}

/// Errors raised before an action reaches the backend.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The document has no value in its key field.
    #[error("{action} requires a value in key field {key_field:?}")]
    MissingKey { action: String, key_field: String },

    /// The key value cannot identify a document.
    #[error("invalid key: {message}")]
    InvalidKey { message: String },

    /// Create was given a document that already carries a revision.
    #[error("create must not carry a revision (key {key})")]
    RevisionOnCreate { key: String },

    /// A field path is empty or malformed.
    #[error("invalid field path {path:?}: {message}")]
    InvalidFieldPath { path: String, message: String },

    /// An update's modifications are not acceptable.
    #[error("invalid mods: {message}")]
    InvalidMods { message: String },

    /// A record document was given a field its schema does not declare.
    #[error("record {record} has no field {field:?}")]
    UnknownField { record: String, field: String },

    /// Collection configuration is inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The operation is not supported by this backend.
    #[error("{operation} is not supported by {backend_name}")]
    Unsupported {
        backend_name: String,
        operation: String,
    },
}

/// Errors produced while converting values between representations.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Free-form serde error.
    #[error("codec error: {0}")]
    Message(String),

    /// An unsigned integer does not fit the portable 64-bit signed representation.
    #[error("unsigned integer {value} overflows int64")]
    IntegerOverflow { value: u64 },

    /// The value has a shape the target representation cannot hold.
    #[error("cannot represent {found} as {expected}")]
    Unrepresentable { expected: String, found: String },

    /// Map keys must encode to strings.
    #[error("map key must be a string, integer or boolean, found {found}")]
    KeyMustBeString { found: String },

    /// A timestamp could not be parsed or constructed.
    #[error("invalid timestamp: {message}")]
    InvalidTime { message: String },

    /// JSON (de)serialization failure in a native codec.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl serde::ser::Error for CodecError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CodecError::Message(msg.to_string())
    }
}

impl serde::de::Error for CodecError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CodecError::Message(msg.to_string())
    }
}

/// Errors from the caller's execution context.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context was canceled.
    #[error("context canceled")]
    Canceled,

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors from a backend driver.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// A connection could not be established or checked out.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// A collection could not be opened or created.
    #[error("cannot open collection {collection} on {backend_name}: {message}")]
    CollectionUnavailable {
        backend_name: String,
        collection: String,
        message: String,
    },

    /// Any other backend failure, with its original cause.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Stable classification of every error the store reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    FailedPrecondition,
    InvalidArgument,
    Canceled,
    DeadlineExceeded,
    Unimplemented,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::FailedPrecondition => "FailedPrecondition",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::Canceled => "Canceled",
            ErrorKind::DeadlineExceeded => "DeadlineExceeded",
            ErrorKind::Unimplemented => "Unimplemented",
            ErrorKind::Internal => "Internal",
        };
        write!(f, "{}", name)
    }
}

impl DocstoreError {
    /// Returns the stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocstoreError::Document(DocumentError::NotFound { .. }) => ErrorKind::NotFound,
            DocstoreError::Document(DocumentError::AlreadyExists { .. }) => {
                ErrorKind::AlreadyExists
            }
            DocstoreError::Concurrency(_) => ErrorKind::FailedPrecondition,
            DocstoreError::Validation(ValidationError::Unsupported { .. }) => {
                ErrorKind::Unimplemented
            }
            DocstoreError::Validation(_) => ErrorKind::InvalidArgument,
            DocstoreError::Codec(_) => ErrorKind::Internal,
            DocstoreError::Context(ContextError::Canceled) => ErrorKind::Canceled,
            DocstoreError::Context(ContextError::DeadlineExceeded) => ErrorKind::DeadlineExceeded,
            DocstoreError::Backend(_) => ErrorKind::Internal,
        }
    }

    /// Returns true for the outcomes of an optimistic-concurrency race,
    /// where re-reading and retrying is the expected response.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::FailedPrecondition | ErrorKind::NotFound
        )
    }

    pub(crate) fn not_found(collection: &str, key: impl fmt::Display) -> Self {
        DocumentError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
        .into()
    }

    pub(crate) fn already_exists(collection: &str, key: impl fmt::Display) -> Self {
        DocumentError::AlreadyExists {
            collection: collection.to_string(),
            key: key.to_string(),
        }
        .into()
    }

    pub(crate) fn internal(backend_name: &str, message: impl Into<String>) -> Self {
        BackendError::Internal {
            backend_name: backend_name.to_string(),
            message: message.into(),
            source: None,
        }
        .into()
    }
}

/// Result type alias for document store operations.
pub type DocstoreResult<T> = Result<T, DocstoreError>;

impl From<serde_json::Error> for DocstoreError {
    fn from(err: serde_json::Error) -> Self {
        DocstoreError::Codec(CodecError::Json(err))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DocstoreError {
    fn from(err: rusqlite::Error) -> Self {
        DocstoreError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for DocstoreError {
    fn from(err: r2d2::Error) -> Self {
        DocstoreError::Backend(BackendError::ConnectionFailed {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
        })
    }
}

/// Failure of one action within a batch.
///
/// `index` is the position of the failing action, which is also the number
/// of actions that completed before it. Actions after `index` were not
/// attempted.
#[derive(Error, Debug)]
#[error("action {index} failed: {source}")]
pub struct ActionListError {
    pub index: usize,
    #[source]
    pub source: DocstoreError,
}

impl ActionListError {
    pub fn new(index: usize, source: DocstoreError) -> Self {
        Self { index, source }
    }

    /// Number of actions that succeeded before the failure.
    pub fn succeeded(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn into_inner(self) -> DocstoreError {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_error_display() {
        let err = DocumentError::NotFound {
            collection: "players".to_string(),
            key: "alice".to_string(),
        };
        assert_eq!(err.to_string(), "document not found: players/alice");
    }

    #[test]
    fn test_revision_mismatch_display() {
        let err = ConcurrencyError::RevisionMismatch {
            collection: "players".to_string(),
            key: "alice".to_string(),
            expected: "1".to_string(),
            actual: "2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "revision mismatch for players/alice: expected 1, found 2"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            DocstoreError::not_found("c", "k").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DocstoreError::already_exists("c", "k").kind(),
            ErrorKind::AlreadyExists
        );
        let conflict: DocstoreError = ConcurrencyError::RevisionMismatch {
            collection: "c".to_string(),
            key: "k".to_string(),
            expected: "1".to_string(),
            actual: "2".to_string(),
        }
        .into();
        assert_eq!(conflict.kind(), ErrorKind::FailedPrecondition);
        assert!(conflict.is_retryable_conflict());

        let unsupported: DocstoreError = ValidationError::Unsupported {
            backend_name: "memory".to_string(),
            operation: "query".to_string(),
        }
        .into();
        assert_eq!(unsupported.kind(), ErrorKind::Unimplemented);

        let canceled: DocstoreError = ContextError::Canceled.into();
        assert_eq!(canceled.kind(), ErrorKind::Canceled);
        assert!(!canceled.is_retryable_conflict());

        assert_eq!(
            DocstoreError::internal("sqlite", "boom").kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_action_list_error() {
        let err = ActionListError::new(2, DocstoreError::not_found("c", "k"));
        assert_eq!(err.succeeded(), 2);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            err.to_string(),
            "action 2 failed: document not found: c/k"
        );
    }

    #[test]
    fn test_backend_error_preserves_source() {
        use std::error::Error as _;

        let io = std::io::Error::other("disk full");
        let err = DocstoreError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: "write failed".to_string(),
            source: Some(Box::new(io)),
        });
        let source = err.source().expect("source preserved");
        assert_eq!(source.to_string(), "disk full");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DocstoreError = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
