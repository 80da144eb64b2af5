//! Dotted field paths into nested maps.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{DocstoreError, ValidationError};

use super::Value;

/// A path of field names, written `a.b.c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parses a dotted path. Every segment must be non-empty.
    pub fn parse(path: &str) -> Result<Self, DocstoreError> {
        if path.is_empty() {
            return Err(invalid(path, "empty path"));
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(invalid(path, "empty path segment"));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The top-level field name.
    pub fn head(&self) -> &str {
        &self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if one path is a prefix of the other, including equality.
    pub fn overlaps(&self, other: &FieldPath) -> bool {
        let n = self.0.len().min(other.0.len());
        self.0[..n] == other.0[..n]
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = DocstoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn invalid(path: &str, message: &str) -> DocstoreError {
    ValidationError::InvalidFieldPath {
        path: path.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Reads the value at `path`, descending through nested maps.
pub fn get_path<'a>(fields: &'a BTreeMap<String, Value>, path: &FieldPath) -> Option<&'a Value> {
    let (last, parents) = path.0.split_last()?;
    let mut current = fields;
    for segment in parents {
        current = current.get(segment)?.as_map()?;
    }
    current.get(last)
}

/// Writes `value` at `path`, creating intermediate maps as needed.
///
/// Fails if an intermediate segment holds a non-map value.
pub fn set_path(
    fields: &mut BTreeMap<String, Value>,
    path: &FieldPath,
    value: Value,
) -> Result<(), DocstoreError> {
    let Some((last, parents)) = path.0.split_last() else {
        return Err(invalid("", "empty path"));
    };
    let mut current = fields;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        current = match entry {
            Value::Map(map) => map,
            other => {
                return Err(invalid(
                    &path.to_string(),
                    &format!("{} is a {}, not a map", segment, other.type_name()),
                ));
            }
        };
    }
    current.insert(last.clone(), value);
    Ok(())
}

/// Removes the value at `path`, returning it. Missing paths are not an error.
pub fn delete_path(fields: &mut BTreeMap<String, Value>, path: &FieldPath) -> Option<Value> {
    let (last, parents) = path.0.split_last()?;
    let mut current = fields;
    for segment in parents {
        current = current.get_mut(segment)?.as_map_mut()?;
    }
    current.remove(last)
}

/// Copies only the listed paths out of `fields`, keeping their nesting.
pub fn project(fields: &BTreeMap<String, Value>, paths: &[FieldPath]) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for path in paths {
        if let Some(value) = get_path(fields, path) {
            // Paths were validated on parse and `out` only holds maps on the way down.
            let _ = set_path(&mut out, path, value.clone());
        }
    }
    out
}
