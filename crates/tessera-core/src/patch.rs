//! Structural patches emitted by the replicated document.
//!
//! A patch describes one operation at a path inside the document. On the
//! wire every patch has the same loose shape
//! `{action, path, value?, values?, length?}`; in memory it is a tagged union
//! with a distinct payload per action, so consumers match exhaustively.

use crate::error::{PatchError, WireError};
use crate::path::Path;
use crate::record::RecordId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One structural operation against the document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePatch", into = "WirePatch")]
pub enum Patch {
    /// Assign `value` at `path`. A path of length 1 creates a record.
    Put { path: Path, value: Value },
    /// Insert `values` into the array at `path[..-1]`, starting at index `path[-1]`.
    Insert { path: Path, values: Vec<Value> },
    /// Overwrite the scalar at `path`.
    Update { path: Path, value: Value },
    /// Splice `value` into the sequence at `path[..-1]` at offset `path[-1]`.
    Splice { path: Path, value: Value },
    /// Delete the value at `path`; `length` elements when it addresses an array.
    Del { path: Path, length: usize },
    /// An action this crate does not know about.
    Unrecognized { action: String, path: Path },
}

impl Patch {
    pub fn put(path: Path, value: impl Into<Value>) -> Self {
        Patch::Put {
            path,
            value: value.into(),
        }
    }

    pub fn insert(path: Path, values: Vec<Value>) -> Self {
        Patch::Insert { path, values }
    }

    pub fn update(path: Path, value: impl Into<Value>) -> Self {
        Patch::Update {
            path,
            value: value.into(),
        }
    }

    pub fn splice(path: Path, value: impl Into<Value>) -> Self {
        Patch::Splice {
            path,
            value: value.into(),
        }
    }

    pub fn del(path: Path) -> Self {
        Patch::Del { path, length: 1 }
    }

    pub fn path(&self) -> &Path {
        match self {
            Patch::Put { path, .. }
            | Patch::Insert { path, .. }
            | Patch::Update { path, .. }
            | Patch::Splice { path, .. }
            | Patch::Del { path, .. }
            | Patch::Unrecognized { path, .. } => path,
        }
    }

    /// The wire name of this patch's action.
    pub fn action(&self) -> &str {
        match self {
            Patch::Put { .. } => "put",
            Patch::Insert { .. } => "insert",
            Patch::Update { .. } => "update",
            Patch::Splice { .. } => "splice",
            Patch::Del { .. } => "del",
            Patch::Unrecognized { action, .. } => action,
        }
    }

    /// The record that owns the patched location.
    pub fn record_id(&self) -> Result<RecordId, PatchError> {
        self.path().record_id()
    }
}

/// The loose, untyped shape patches take on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WirePatch {
    pub action: String,
    pub path: Path,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

/// Keep an explicit `null` payload distinct from an absent one.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<WirePatch> for Patch {
    type Error = WireError;

    fn try_from(wire: WirePatch) -> Result<Self, Self::Error> {
        let WirePatch {
            action,
            path,
            value,
            values,
            length,
        } = wire;

        let missing = |action: &'static str, path: &Path, field: &'static str| {
            WireError::MissingPayload {
                action,
                path: path.to_string(),
                field,
            }
        };

        Ok(match action.as_str() {
            "put" => match value {
                Some(value) => Patch::Put { path, value },
                None => return Err(missing("put", &path, "value")),
            },
            "update" => match value {
                Some(value) => Patch::Update { path, value },
                None => return Err(missing("update", &path, "value")),
            },
            "splice" => match value {
                Some(value) => Patch::Splice { path, value },
                None => return Err(missing("splice", &path, "value")),
            },
            "insert" => match values {
                Some(values) => Patch::Insert { path, values },
                None => return Err(missing("insert", &path, "values")),
            },
            "del" => Patch::Del {
                path,
                length: length.unwrap_or(1),
            },
            _ => Patch::Unrecognized { action, path },
        })
    }
}

impl From<Patch> for WirePatch {
    fn from(patch: Patch) -> Self {
        let action = patch.action().to_string();
        let blank = |path: Path| WirePatch {
            action: action.clone(),
            path,
            value: None,
            values: None,
            length: None,
        };
        match patch {
            Patch::Put { path, value }
            | Patch::Update { path, value }
            | Patch::Splice { path, value } => WirePatch {
                value: Some(value),
                ..blank(path)
            },
            Patch::Insert { path, values } => WirePatch {
                values: Some(values),
                ..blank(path)
            },
            Patch::Del { path, length } => WirePatch {
                length: (length != 1).then_some(length),
                ..blank(path)
            },
            Patch::Unrecognized { path, .. } => blank(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_decoding() {
        let patches: Vec<Patch> = serde_json::from_value(json!([
            {"action": "put", "path": ["shape:a", "x"], "value": 10},
            {"action": "insert", "path": ["shape:a", "points", 0], "values": [1, 2]},
            {"action": "del", "path": ["shape:a"]},
            {"action": "inc", "path": ["shape:a", "count"], "value": 1}
        ]))
        .unwrap();

        assert_eq!(patches[0], Patch::put(Path::parse("shape:a.x"), 10));
        assert_eq!(
            patches[1],
            Patch::insert(Path::parse("shape:a.points.0"), vec![json!(1), json!(2)])
        );
        assert_eq!(patches[2], Patch::del(Path::parse("shape:a")));
        assert_eq!(
            patches[3],
            Patch::Unrecognized {
                action: "inc".to_string(),
                path: Path::parse("shape:a.count")
            }
        );
    }

    #[test]
    fn test_explicit_null_is_a_payload() {
        let patch: Patch = serde_json::from_value(json!(
            {"action": "put", "path": ["shape:a", "parent"], "value": null}
        ))
        .unwrap();
        assert_eq!(patch, Patch::put(Path::parse("shape:a.parent"), Value::Null));
    }

    #[test]
    fn test_missing_payload_is_rejected() {
        let result: Result<Patch, _> =
            serde_json::from_value(json!({"action": "insert", "path": ["shape:a", "xs", 0]}));
        assert!(result.is_err());

        let wire = WirePatch {
            action: "put".to_string(),
            path: Path::parse("shape:a.x"),
            value: None,
            values: None,
            length: None,
        };
        assert!(matches!(
            Patch::try_from(wire),
            Err(WireError::MissingPayload { field: "value", .. })
        ));
    }

    #[test]
    fn test_del_length_on_the_wire() {
        let patch = Patch::Del {
            path: Path::parse("shape:a.points.1"),
            length: 2,
        };
        let wire = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            wire,
            json!({"action": "del", "path": ["shape:a", "points", 1], "length": 2})
        );
        let single = serde_json::to_value(Patch::del(Path::parse("shape:a"))).unwrap();
        assert_eq!(single, json!({"action": "del", "path": ["shape:a"]}));
    }

    #[test]
    fn test_accessors() {
        let patch = Patch::update(Path::parse("shape:a.props.w"), 5);
        assert_eq!(patch.action(), "update");
        assert_eq!(patch.record_id().unwrap().as_str(), "shape:a");
        assert_eq!(patch.path().len(), 3);
    }
}
