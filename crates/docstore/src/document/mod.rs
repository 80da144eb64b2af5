//! Documents and the portable value model.
//!
//! A [`Document`] is either a free-form [`MapDocument`] or a
//! [`RecordDocument`] whose fields are declared by a [`RecordSchema`]. Both
//! variants expose the same capability set, so the executor and drivers
//! never care which one the caller chose:
//!
//! - [`Document::get_field`], [`Document::set_field`], [`Document::delete_field`]
//! - [`Document::keys`]
//! - [`Document::has_revision_slot`]
//!
//! Typed structs become record documents through the [`Record`] trait.
//!
//! # Example
//!
//! ```
//! use helios_docstore::document;
//! use helios_docstore::document::{Document, Value};
//!
//! let mut doc = document! { "_id" => "alice", "score" => 10 };
//! doc.set_field("stats.wins", Value::Int(3)).unwrap();
//!
//! assert_eq!(doc.get_field("stats.wins").unwrap(), Some(&Value::Int(3)));
//! assert!(doc.has_revision_slot());
//! ```

mod path;
mod value;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{DocstoreError, DocstoreResult, ValidationError};

pub use path::{FieldPath, delete_path, get_path, project, set_path};
pub use value::Value;

/// Builds a map document from `key => value` pairs.
#[macro_export]
macro_rules! document {
    () => {
        $crate::document::Document::Map($crate::document::MapDocument::new())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut doc = $crate::document::MapDocument::new();
        $(
            doc.insert($key, $crate::document::Value::from($value));
        )+
        $crate::document::Document::Map(doc)
    }};
}

/// A document made of arbitrary named fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapDocument {
    fields: BTreeMap<String, Value>,
}

impl MapDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a top-level field.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl From<BTreeMap<String, Value>> for MapDocument {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

/// Field descriptors of a structured record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    name: String,
    fields: Vec<String>,
    revision_field: Option<String>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            revision_field: None,
        }
    }

    /// Declares a field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.fields.contains(&name) {
            self.fields.push(name);
        }
        self
    }

    /// Declares the revision slot. Records without one skip revision checks.
    pub fn with_revision(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self = self.field(name.clone());
        self.revision_field = Some(name);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn revision_field(&self) -> Option<&str> {
        self.revision_field.as_deref()
    }

    pub fn declares(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// A document whose top-level fields are fixed by a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDocument {
    schema: Arc<RecordSchema>,
    values: BTreeMap<String, Value>,
}

impl RecordDocument {
    pub fn new(schema: impl Into<Arc<RecordSchema>>) -> Self {
        Self {
            schema: schema.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    fn check_declared(&self, field: &str) -> DocstoreResult<()> {
        if self.schema.declares(field) {
            Ok(())
        } else {
            Err(ValidationError::UnknownField {
                record: self.schema.name.clone(),
                field: field.to_string(),
            }
            .into())
        }
    }
}

/// A typed struct that can be stored as a record document.
///
/// The serialized field names must match the schema's declared fields.
pub trait Record: Serialize + DeserializeOwned {
    fn schema() -> RecordSchema;
}

/// A document passed to and filled in by collection operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Map(MapDocument),
    Record(RecordDocument),
}

impl Default for Document {
    fn default() -> Self {
        Document::Map(MapDocument::new())
    }
}

impl From<MapDocument> for Document {
    fn from(doc: MapDocument) -> Self {
        Document::Map(doc)
    }
}

impl From<RecordDocument> for Document {
    fn from(doc: RecordDocument) -> Self {
        Document::Record(doc)
    }
}

impl Document {
    /// An empty map document.
    pub fn new() -> Self {
        Self::default()
    }

    /// A map document holding only `key_field`.
    pub fn with_key(key_field: &str, key: impl Into<Value>) -> Self {
        let mut doc = MapDocument::new();
        doc.insert(key_field, key.into());
        Document::Map(doc)
    }

    /// Encodes a typed record with the portable codec.
    pub fn from_record<R: Record>(record: &R) -> DocstoreResult<Self> {
        let schema = R::schema();
        let values = match codec::encode(record)? {
            Value::Map(values) => values,
            other => {
                return Err(crate::error::CodecError::Unrepresentable {
                    expected: format!("record {}", schema.name()),
                    found: other.type_name().to_string(),
                }
                .into());
            }
        };
        let mut doc = RecordDocument::new(schema);
        for (name, value) in values {
            doc.check_declared(&name)?;
            doc.values.insert(name, value);
        }
        Ok(Document::Record(doc))
    }

    /// Decodes the document's fields into a typed record.
    pub fn to_record<R: Record>(&self) -> DocstoreResult<R> {
        let fields = match self {
            Document::Map(m) => m.fields.clone(),
            Document::Record(r) => r.values.clone(),
        };
        Ok(codec::decode(&Value::Map(fields))?)
    }

    fn fields(&self) -> &BTreeMap<String, Value> {
        match self {
            Document::Map(m) => &m.fields,
            Document::Record(r) => &r.values,
        }
    }

    fn fields_mut(&mut self) -> &mut BTreeMap<String, Value> {
        match self {
            Document::Map(m) => &mut m.fields,
            Document::Record(r) => &mut r.values,
        }
    }

    /// Reads a (possibly nested) field.
    pub fn get_field(&self, path: &str) -> DocstoreResult<Option<&Value>> {
        let path = FieldPath::parse(path)?;
        Ok(get_path(self.fields(), &path))
    }

    /// Writes a (possibly nested) field, creating intermediate maps.
    pub fn set_field(&mut self, path: &str, value: impl Into<Value>) -> DocstoreResult<()> {
        let path = FieldPath::parse(path)?;
        if let Document::Record(r) = self {
            r.check_declared(path.head())?;
        }
        set_path(self.fields_mut(), &path, value.into())
    }

    /// Removes a field, returning its old value.
    pub fn delete_field(&mut self, path: &str) -> DocstoreResult<Option<Value>> {
        let path = FieldPath::parse(path)?;
        Ok(delete_path(self.fields_mut(), &path))
    }

    /// Names of the top-level fields holding a value.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Document::Map(m) => m.fields.keys().map(String::as_str).collect(),
            Document::Record(r) => r
                .schema
                .fields
                .iter()
                .filter(|f| r.values.contains_key(*f))
                .map(String::as_str)
                .collect(),
        }
    }

    /// Number of top-level fields holding a value.
    pub fn len(&self) -> usize {
        self.fields().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Whether the document can carry a revision at all.
    pub fn has_revision_slot(&self) -> bool {
        match self {
            Document::Map(_) => true,
            Document::Record(r) => r.schema.revision_field.is_some(),
        }
    }

    /// Whether `field` is this document's revision slot.
    pub fn revision_slot_is(&self, field: &str) -> bool {
        match self {
            Document::Map(_) => true,
            Document::Record(r) => r.schema.revision_field() == Some(field),
        }
    }

    /// The key value stored in `key_field`, if any.
    pub fn key(&self, key_field: &str) -> Option<&Value> {
        self.fields().get(key_field).filter(|v| !v.is_null())
    }

    /// The revision stored in `revision_field`, if the document has that slot.
    pub fn revision(&self, revision_field: &str) -> Option<&Value> {
        if !self.revision_slot_is(revision_field) {
            return None;
        }
        self.fields().get(revision_field)
    }

    /// Stores a revision. Documents without the slot ignore it.
    pub fn set_revision(&mut self, revision_field: &str, revision: Value) {
        if self.revision_slot_is(revision_field) {
            self.fields_mut().insert(revision_field.to_string(), revision);
        }
    }

    pub fn clear_revision(&mut self, revision_field: &str) {
        if self.revision_slot_is(revision_field) {
            self.fields_mut().remove(revision_field);
        }
    }

    /// The fields a driver persists: everything except the revision.
    pub fn storable_fields(&self, revision_field: &str) -> BTreeMap<String, Value> {
        let mut fields = self.fields().clone();
        fields.remove(revision_field);
        fields
    }

    /// Replaces the document's contents with stored fields and revision.
    ///
    /// The key field is kept as is. Record documents drop stored fields
    /// their schema does not declare.
    pub fn load(
        &mut self,
        mut stored: BTreeMap<String, Value>,
        key_field: &str,
        revision_field: &str,
        revision: Value,
    ) {
        let key = self.fields().get(key_field).cloned();
        stored.remove(revision_field);
        if let Some(key) = key {
            stored.insert(key_field.to_string(), key);
        }
        if let Document::Record(r) = self {
            stored.retain(|name, _| r.schema.declares(name));
        }
        *self.fields_mut() = stored;
        self.set_revision(revision_field, revision);
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Map(m) => write!(f, "{}", Value::Map(m.fields.clone())),
            Document::Record(r) => write!(f, "{} {}", r.schema.name, Value::Map(r.values.clone())),
        }
    }
}

/// A validated document key.
///
/// Keys are strings or integers; anything else cannot identify a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentKey {
    Int(i64),
    String(String),
}

impl DocumentKey {
    /// Extracts and validates the key of `doc`.
    pub fn from_document(doc: &Document, key_field: &str) -> DocstoreResult<Self> {
        match doc.key(key_field) {
            Some(value) => Self::try_from(value),
            None => Err(ValidationError::MissingKey {
                action: "operation".to_string(),
                key_field: key_field.to_string(),
            }
            .into()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            DocumentKey::Int(i) => Value::Int(*i),
            DocumentKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl TryFrom<&Value> for DocumentKey {
    type Error = DocstoreError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) if !s.is_empty() => Ok(DocumentKey::String(s.clone())),
            Value::String(_) => Err(ValidationError::InvalidKey {
                message: "key must not be empty".to_string(),
            }
            .into()),
            Value::Int(i) => Ok(DocumentKey::Int(*i)),
            other => Err(ValidationError::InvalidKey {
                message: format!("key must be a string or integer, found {}", other.type_name()),
            }
            .into()),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::Int(i) => write!(f, "{}", i),
            DocumentKey::String(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Player {
        #[serde(rename = "_id")]
        id: String,
        score: i64,
        #[serde(rename = "DocstoreRevision", default, skip_serializing_if = "Option::is_none")]
        revision: Option<Value>,
    }

    impl Record for Player {
        fn schema() -> RecordSchema {
            RecordSchema::new("Player")
                .field("_id")
                .field("score")
                .with_revision("DocstoreRevision")
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i64,
        y: i64,
    }

    impl Record for Point {
        fn schema() -> RecordSchema {
            RecordSchema::new("Point").field("x").field("y")
        }
    }

    #[test]
    fn test_map_document_fields() {
        let mut doc = crate::document! { "_id" => "k", "a" => "A" };
        assert_eq!(doc.keys(), vec!["_id", "a"]);
        doc.set_field("b.c", true).unwrap();
        assert_eq!(doc.get_field("b.c").unwrap(), Some(&Value::Bool(true)));
        assert_eq!(doc.delete_field("a").unwrap(), Some(Value::from("A")));
        assert_eq!(doc.keys(), vec!["_id", "b"]);
    }

    #[test]
    fn test_map_document_revision() {
        let mut doc = Document::with_key("_id", "k");
        assert!(doc.has_revision_slot());
        assert!(doc.revision("DocstoreRevision").is_none());
        doc.set_revision("DocstoreRevision", Value::Int(1));
        assert_eq!(doc.revision("DocstoreRevision"), Some(&Value::Int(1)));
        assert!(!doc.storable_fields("DocstoreRevision").contains_key("DocstoreRevision"));
        doc.clear_revision("DocstoreRevision");
        assert!(doc.revision("DocstoreRevision").is_none());
    }

    #[test]
    fn test_record_round_trip() {
        let player = Player {
            id: "alice".to_string(),
            score: 10,
            revision: None,
        };
        let mut doc = Document::from_record(&player).unwrap();
        assert!(doc.has_revision_slot());
        assert_eq!(doc.keys(), vec!["_id", "score"]);

        doc.set_revision("DocstoreRevision", Value::Int(4));
        let back: Player = doc.to_record().unwrap();
        assert_eq!(back.revision, Some(Value::Int(4)));
        assert_eq!(back.score, 10);
    }

    #[test]
    fn test_record_without_revision_slot() {
        let mut doc = Document::from_record(&Point { x: 1, y: 2 }).unwrap();
        assert!(!doc.has_revision_slot());
        doc.set_revision("DocstoreRevision", Value::Int(1));
        assert!(doc.revision("DocstoreRevision").is_none());
        assert_eq!(doc.keys(), vec!["x", "y"]);
    }

    #[test]
    fn test_record_rejects_unknown_field() {
        let mut doc = Document::from_record(&Point { x: 1, y: 2 }).unwrap();
        let err = doc.set_field("z", 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        doc.set_field("x", 5).unwrap();
        assert_eq!(doc.to_record::<Point>().unwrap(), Point { x: 5, y: 2 });
    }

    #[test]
    fn test_load_replaces_contents() {
        let mut doc = crate::document! { "_id" => "k", "stale" => 1 };
        let mut stored = BTreeMap::new();
        stored.insert("_id".to_string(), Value::from("k"));
        stored.insert("fresh".to_string(), Value::from(2));
        doc.load(stored, "_id", "DocstoreRevision", Value::Int(7));

        assert_eq!(doc.keys(), vec!["DocstoreRevision", "_id", "fresh"]);
        assert_eq!(doc.revision("DocstoreRevision"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_document_key() {
        let doc = Document::with_key("_id", "k");
        assert_eq!(
            DocumentKey::from_document(&doc, "_id").unwrap(),
            DocumentKey::String("k".to_string())
        );
        let doc = Document::with_key("_id", 5);
        assert_eq!(DocumentKey::from_document(&doc, "_id").unwrap(), DocumentKey::Int(5));

        let missing = Document::new();
        assert_eq!(
            DocumentKey::from_document(&missing, "_id").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert!(DocumentKey::try_from(&Value::Float(1.5)).is_err());
        assert!(DocumentKey::try_from(&Value::from("")).is_err());
        assert_eq!(serde_json::to_string(&DocumentKey::Int(5)).unwrap(), "5");
    }
}
