//! Optimistic concurrency through document revisions.
//!
//! A document may carry a revision in its revision field. When it does, a
//! write only succeeds if the stored document still has that revision:
//!
//! 1. No revision on the document: the write is unconditional.
//! 2. Revision present, document missing: `NotFound`.
//! 3. Revision present and different from the stored one: `FailedPrecondition`.
//! 4. Otherwise the write goes through and stores a fresh revision, which is
//!    copied back into the caller's document.
//!
//! Drivers must perform the check and the write atomically. How revisions
//! are encoded and compared is up to each driver; see
//! [`Driver::revisions_match`](super::Driver::revisions_match).

use std::fmt::{self, Debug};

use crate::document::{Document, Value};
use crate::error::{ConcurrencyError, DocstoreError, DocstoreResult};

use super::KeyGenerator;

/// An opaque revision token.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision(Value);

impl Revision {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Revision> for Value {
    fn from(rev: Revision) -> Self {
        rev.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The revision a write must match, if the caller requested a check.
///
/// Documents without a revision slot, or with a null revision, request no
/// check.
pub fn expected_revision<'d>(doc: &'d Document, revision_field: &str) -> Option<&'d Value> {
    if !doc.has_revision_slot() {
        return None;
    }
    doc.revision(revision_field).filter(|v| !v.is_null())
}

/// Applies the revision precondition against the stored revision.
///
/// `stored` is `None` when no document is stored under the key.
pub fn check_precondition(
    collection: &str,
    key: impl fmt::Display,
    stored: Option<&Value>,
    expected: Option<&Value>,
    matches: impl Fn(&Value, &Value) -> bool,
) -> DocstoreResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match stored {
        None => Err(DocstoreError::not_found(collection, key)),
        Some(stored) if matches(stored, expected) => Ok(()),
        Some(stored) => {
            let key = key.to_string();
            tracing::warn!(
                collection,
                key = key.as_str(),
                "revision precondition failed: expected {}, found {}",
                expected,
                stored
            );
            Err(ConcurrencyError::RevisionMismatch {
                collection: collection.to_string(),
                key,
                expected: expected.to_string(),
                actual: stored.to_string(),
            }
            .into())
        }
    }
}

/// Source of fresh revisions for drivers that mint their own.
pub trait RevisionSource: Send + Sync + Debug {
    /// Returns a revision distinct from `previous`.
    fn next_revision(&self, previous: Option<&Value>) -> Revision;
}

/// Version counters: 1, 2, 3, ...
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterRevisions;

impl RevisionSource for CounterRevisions {
    fn next_revision(&self, previous: Option<&Value>) -> Revision {
        match previous {
            Some(Value::Int(n)) => Revision::new(n.wrapping_add(1)),
            _ => Revision::new(1i64),
        }
    }
}

/// Opaque etags: a random UUID per write.
#[derive(Debug, Default)]
pub struct UuidRevisions {
    keys: KeyGenerator,
}

impl UuidRevisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            keys: KeyGenerator::seeded(seed),
        }
    }
}

impl RevisionSource for UuidRevisions {
    fn next_revision(&self, _previous: Option<&Value>) -> Revision {
        Revision::new(self.keys.unique_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{RecordDocument, RecordSchema};
    use crate::error::ErrorKind;

    const REV: &str = "DocstoreRevision";

    fn eq(a: &Value, b: &Value) -> bool {
        a == b
    }

    #[test]
    fn test_expected_revision() {
        let mut doc = Document::with_key("_id", "k");
        assert!(expected_revision(&doc, REV).is_none());
        doc.set_revision(REV, Value::Null);
        assert!(expected_revision(&doc, REV).is_none());
        doc.set_revision(REV, Value::Int(3));
        assert_eq!(expected_revision(&doc, REV), Some(&Value::Int(3)));
    }

    #[test]
    fn test_record_without_slot_skips_check() {
        let schema = RecordSchema::new("Point").field("x");
        let mut doc = Document::Record(RecordDocument::new(schema));
        doc.set_revision(REV, Value::Int(3));
        assert!(expected_revision(&doc, REV).is_none());
    }

    #[test]
    fn test_check_precondition_outcomes() {
        let one = Value::Int(1);
        let two = Value::Int(2);

        assert!(check_precondition("c", "k", None, None, eq).is_ok());
        assert!(check_precondition("c", "k", Some(&one), None, eq).is_ok());
        assert!(check_precondition("c", "k", Some(&one), Some(&one), eq).is_ok());

        let err = check_precondition("c", "k", None, Some(&one), eq).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = check_precondition("c", "k", Some(&two), Some(&one), eq).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    }

    #[test]
    fn test_counter_revisions() {
        let source = CounterRevisions;
        let first = source.next_revision(None);
        assert_eq!(first.value(), &Value::Int(1));
        let second = source.next_revision(Some(first.value()));
        assert_eq!(second.value(), &Value::Int(2));
    }

    #[test]
    fn test_uuid_revisions_are_distinct() {
        let source = UuidRevisions::seeded(7);
        let a = source.next_revision(None);
        let b = source.next_revision(Some(a.value()));
        assert_ne!(a, b);
    }
}
