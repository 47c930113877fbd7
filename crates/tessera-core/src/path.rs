//! Paths into the replicated document and explicit path resolution.

use crate::error::PatchError;
use crate::record::{value_kind, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A segment in a document path. On the wire a key is a JSON string and an
/// index is a JSON integer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    /// Array index.
    Index(usize),
    /// Object key.
    Key(String),
}

impl std::fmt::Display for PathKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathKey::Key(k) => write!(f, "{}", k),
            PathKey::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        PathKey::Key(key.to_string())
    }
}

impl From<String> for PathKey {
    fn from(key: String) -> Self {
        PathKey::Key(key)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

/// A path from the document root. The first key always names the record
/// that owns everything below it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathKey>);

impl Path {
    pub fn new(keys: Vec<PathKey>) -> Self {
        Self(keys)
    }

    /// The path of a whole record.
    pub fn record(id: &RecordId) -> Self {
        Self(vec![PathKey::Key(id.as_str().to_string())])
    }

    /// Parse a path from dot notation (e.g., "shape:a.props.points.0").
    /// Numeric segments become indices.
    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::default();
        }
        let keys = path
            .split('.')
            .map(|s| match s.parse::<usize>() {
                Ok(idx) => PathKey::Index(idx),
                Err(_) => PathKey::Key(s.to_string()),
            })
            .collect();
        Self(keys)
    }

    pub fn keys(&self) -> &[PathKey] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PathKey> {
        self.0.last()
    }

    /// The record this path belongs to.
    pub fn record_id(&self) -> Result<RecordId, PatchError> {
        match self.0.first() {
            Some(PathKey::Key(id)) => Ok(RecordId::new(id.clone())),
            Some(PathKey::Index(_)) => Err(PatchError::InvalidPath {
                path: self.to_string(),
                reason: "path must start with a record id",
            }),
            None => Err(PatchError::InvalidPath {
                path: String::new(),
                reason: "empty path",
            }),
        }
    }

    pub fn push(&mut self, key: impl Into<PathKey>) {
        self.0.push(key.into());
    }

    pub fn pop(&mut self) -> Option<PathKey> {
        self.0.pop()
    }

    /// Create a child path.
    pub fn child(&self, key: impl Into<PathKey>) -> Self {
        let mut new = self.clone();
        new.push(key);
        new
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", describe(&self.0))
    }
}

impl From<Vec<PathKey>> for Path {
    fn from(keys: Vec<PathKey>) -> Self {
        Self(keys)
    }
}

impl FromIterator<PathKey> for Path {
    fn from_iter<I: IntoIterator<Item = PathKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Dot-joined rendering of a key sequence.
pub(crate) fn describe(keys: &[PathKey]) -> String {
    let s: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    s.join(".")
}

/// Follow `keys` below `root`.
///
/// Every key must name an existing child: a missing child is
/// [`PatchError::MissingAncestor`], walking into a value of the wrong kind is
/// [`PatchError::TypeMismatch`], and an index past the end of an array is
/// [`PatchError::IndexOutOfRange`]. Objects accept index keys as their
/// decimal string form.
pub fn resolve<'a>(root: &'a Value, keys: &[PathKey]) -> Result<&'a Value, PatchError> {
    let mut current = root;
    for (depth, key) in keys.iter().enumerate() {
        current = match (current, key) {
            (Value::Object(map), key) => map
                .get(&key.to_string())
                .ok_or_else(|| missing(&keys[..=depth]))?,
            (Value::Array(items), PathKey::Index(i)) => items
                .get(*i)
                .ok_or_else(|| out_of_range(&keys[..=depth], *i, items.len()))?,
            (other, key) => return Err(mismatch(&keys[..=depth], key, other)),
        };
    }
    Ok(current)
}

/// Mutable counterpart of [`resolve`] with the same failure policy.
pub fn resolve_mut<'a>(root: &'a mut Value, keys: &[PathKey]) -> Result<&'a mut Value, PatchError> {
    let mut current = root;
    for (depth, key) in keys.iter().enumerate() {
        current = match (current, key) {
            (Value::Object(map), key) => map
                .get_mut(&key.to_string())
                .ok_or_else(|| missing(&keys[..=depth]))?,
            (Value::Array(items), PathKey::Index(i)) => {
                let length = items.len();
                items
                    .get_mut(*i)
                    .ok_or_else(|| out_of_range(&keys[..=depth], *i, length))?
            }
            (other, key) => return Err(mismatch(&keys[..=depth], key, other)),
        };
    }
    Ok(current)
}

fn missing(keys: &[PathKey]) -> PatchError {
    PatchError::MissingAncestor {
        path: describe(keys),
    }
}

fn out_of_range(keys: &[PathKey], index: usize, length: usize) -> PatchError {
    PatchError::IndexOutOfRange {
        path: describe(keys),
        index,
        length,
    }
}

fn mismatch(keys: &[PathKey], key: &PathKey, found: &Value) -> PatchError {
    PatchError::TypeMismatch {
        path: describe(keys),
        expected: match key {
            PathKey::Index(_) => "array or object",
            PathKey::Key(_) => "object",
        },
        found: value_kind(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_parsing() {
        let path = Path::parse("shape:a.props.points.0.x");
        assert_eq!(path.len(), 5);
        assert!(matches!(path.keys()[3], PathKey::Index(0)));
        assert_eq!(path.record_id().unwrap().as_str(), "shape:a");
        assert_eq!(path.to_string(), "shape:a.props.points.0.x");
    }

    #[test]
    fn test_record_id_invariant() {
        assert!(Path::default().record_id().is_err());
        assert!(Path::new(vec![PathKey::Index(0)]).record_id().is_err());
    }

    #[test]
    fn test_wire_form() {
        let path: Path = serde_json::from_value(json!(["shape:a", "points", 2])).unwrap();
        assert_eq!(path, Path::parse("shape:a.points.2"));
        assert_eq!(serde_json::to_value(&path).unwrap(), json!(["shape:a", "points", 2]));
    }

    #[test]
    fn test_resolve() {
        let value = json!({"props": {"points": [{"x": 1}, {"x": 2}]}});
        let keys = Path::parse("props.points.1.x");
        assert_eq!(resolve(&value, keys.keys()), Ok(&json!(2)));
        assert_eq!(resolve(&value, &[]), Ok(&value));
    }

    #[test]
    fn test_resolve_missing_ancestor() {
        let value = json!({"props": {}});
        let err = resolve(&value, Path::parse("props.meta.color").keys()).unwrap_err();
        assert_eq!(
            err,
            PatchError::MissingAncestor {
                path: "props.meta".to_string()
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_resolve_type_mismatch_and_range() {
        let mut value = json!({"w": 10, "items": [1, 2]});
        let err = resolve_mut(&mut value, Path::parse("w.inner").keys()).unwrap_err();
        assert!(matches!(err, PatchError::TypeMismatch { found: "number", .. }));

        let err = resolve_mut(&mut value, Path::parse("items.5").keys()).unwrap_err();
        assert!(matches!(
            err,
            PatchError::IndexOutOfRange {
                index: 5,
                length: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_resolve_mut_edits_in_place() {
        let mut value = json!({"props": {"w": 10}});
        *resolve_mut(&mut value, Path::parse("props.w").keys()).unwrap() = json!(20);
        assert_eq!(value, json!({"props": {"w": 20}}));
    }
}
