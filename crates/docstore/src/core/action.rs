//! Actions and update modifications.

use std::collections::BTreeMap;
use std::fmt;

use crate::document::{Document, FieldPath, Value, delete_path, set_path};
use crate::error::{DocstoreResult, ValidationError};

/// The six kinds of action a batch can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Create,
    Put,
    Replace,
    Get,
    Delete,
    Update,
}

impl ActionKind {
    /// True for every kind except Get.
    pub fn is_write(&self) -> bool {
        !matches!(self, ActionKind::Get)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Create => "create",
            ActionKind::Put => "put",
            ActionKind::Replace => "replace",
            ActionKind::Get => "get",
            ActionKind::Delete => "delete",
            ActionKind::Update => "update",
        };
        write!(f, "{}", name)
    }
}

/// Field modifications for an Update action.
///
/// Each entry sets a field path to a value, or removes it (`None`).
///
/// ```
/// use helios_docstore::core::Mods;
///
/// let mods = Mods::new().set("a", "X").unset("b").set("c", "C");
/// assert_eq!(mods.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mods {
    entries: BTreeMap<String, Option<Value>>,
}

/// A validated modification.
pub type Mod = (FieldPath, Option<Value>);

impl Mods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `path` to `value`.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(path.into(), Some(value.into()));
        self
    }

    /// Removes `path`.
    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.entries.insert(path.into(), None);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, value: Option<Value>) {
        self.entries.insert(path.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Parses every path and rejects modifications that cannot be applied:
    /// malformed paths, changes to the key or revision field, and paths
    /// where one is a prefix of another.
    pub fn validate(&self, key_field: &str, revision_field: &str) -> DocstoreResult<Vec<Mod>> {
        let mut parsed: Vec<Mod> = Vec::with_capacity(self.entries.len());
        for (path, value) in &self.entries {
            let path = FieldPath::parse(path)?;
            if path.head() == key_field {
                return Err(invalid_mods(format!("cannot modify key field {:?}", key_field)));
            }
            if path.head() == revision_field {
                return Err(invalid_mods(format!(
                    "cannot modify revision field {:?}",
                    revision_field
                )));
            }
            if let Some((other, _)) = parsed.iter().find(|(p, _)| p.overlaps(&path)) {
                return Err(invalid_mods(format!("paths {} and {} overlap", other, path)));
            }
            parsed.push((path, value.clone()));
        }
        Ok(parsed)
    }
}

impl From<BTreeMap<String, Option<Value>>> for Mods {
    fn from(entries: BTreeMap<String, Option<Value>>) -> Self {
        Self { entries }
    }
}

impl<K: Into<String>> FromIterator<(K, Option<Value>)> for Mods {
    fn from_iter<I: IntoIterator<Item = (K, Option<Value>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

fn invalid_mods(message: String) -> crate::error::DocstoreError {
    ValidationError::InvalidMods { message }.into()
}

/// Applies validated modifications to stored fields.
pub fn apply_mods(fields: &mut BTreeMap<String, Value>, mods: &[Mod]) -> DocstoreResult<()> {
    for (path, value) in mods {
        match value {
            Some(value) => set_path(fields, path, value.clone())?,
            None => {
                delete_path(fields, path);
            }
        }
    }
    Ok(())
}

/// One validated action handed to a driver.
///
/// The action borrows the caller's document: Get fills it in, and writes
/// store the new revision in it.
#[derive(Debug)]
pub struct Action<'a> {
    kind: ActionKind,
    doc: &'a mut Document,
    mods: Vec<Mod>,
    field_paths: Vec<FieldPath>,
}

impl<'a> Action<'a> {
    pub(crate) fn new(
        kind: ActionKind,
        doc: &'a mut Document,
        mods: Vec<Mod>,
        field_paths: Vec<FieldPath>,
    ) -> Self {
        Self {
            kind,
            doc,
            mods,
            field_paths,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn document(&self) -> &Document {
        &*self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut *self.doc
    }

    /// Modifications of an Update action; empty for other kinds.
    pub fn mods(&self) -> &[Mod] {
        &self.mods
    }

    /// Projection of a Get action; empty means the whole document.
    pub fn field_paths(&self) -> &[FieldPath] {
        &self.field_paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_mods_validate() {
        let mods = Mods::new().set("a", "X").unset("b").set("c.d", 1);
        let parsed = mods.validate("_id", "DocstoreRevision").unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(Mods::new().validate("_id", "DocstoreRevision").unwrap().is_empty());
    }

    #[test]
    fn test_mods_reject_key_and_revision() {
        let err = Mods::new()
            .set("_id", "other")
            .validate("_id", "DocstoreRevision")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert!(
            Mods::new()
                .set("DocstoreRevision", 1)
                .validate("_id", "DocstoreRevision")
                .is_err()
        );
    }

    #[test]
    fn test_mods_reject_overlap_and_empty_paths() {
        assert!(
            Mods::new()
                .set("a", 1)
                .set("a.b", 2)
                .validate("_id", "rev")
                .is_err()
        );
        assert!(Mods::new().set("", 1).validate("_id", "rev").is_err());
        assert!(Mods::new().set("a..b", 1).validate("_id", "rev").is_err());
    }

    #[test]
    fn test_apply_mods() {
        let mut fields = BTreeMap::new();
        fields.insert("_id".to_string(), Value::from("k"));
        fields.insert("a".to_string(), Value::from("A"));
        fields.insert("b".to_string(), Value::from("B"));

        let mods = Mods::new()
            .set("a", "X")
            .unset("b")
            .set("c", "C")
            .set("n.m", 1)
            .validate("_id", "rev")
            .unwrap();
        apply_mods(&mut fields, &mods).unwrap();

        assert_eq!(fields["a"], Value::from("X"));
        assert!(!fields.contains_key("b"));
        assert_eq!(fields["c"], Value::from("C"));
        assert_eq!(fields["n"].as_map().unwrap()["m"], Value::Int(1));
        assert_eq!(fields["_id"], Value::from("k"));
    }

    #[test]
    fn test_mods_from_iterator() {
        let mods: Mods = vec![("a", Some(Value::Int(1))), ("b", None)]
            .into_iter()
            .collect();
        assert_eq!(mods.iter().count(), 2);
        assert!(ActionKind::Update.is_write());
        assert!(!ActionKind::Get.is_write());
    }
}
