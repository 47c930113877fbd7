//! Applying a single patch to the tree of the record it addresses.
//!
//! Every function here takes the record's own JSON object as root; the
//! record id at `path[0]` has already been used to pick it. Unsupported
//! operations are detected before anything is mutated, so a rejected patch
//! never leaves a half-applied working copy behind.

use crate::error::PatchError;
use crate::patch::Patch;
use crate::path::{describe, resolve_mut, PathKey};
use crate::record::value_kind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What to do with a `del` patch below the record root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NestedDelete {
    /// Reject it as an unsupported operation.
    #[default]
    Reject,
    /// Remove the object key, or `length` array elements at the index.
    Remove,
}

/// Options controlling patch application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub nested_delete: NestedDelete,
}

/// Outcome of applying one patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The record tree was written to.
    Modified,
    /// The patch only asserts that the record exists.
    Materialized,
    /// The whole record was deleted.
    RemoveRecord,
}

/// Apply `patch` to `record`, the JSON object of the record at `path[0]`.
pub fn apply_patch(
    record: &mut Value,
    patch: &Patch,
    options: &ApplyOptions,
) -> Result<Applied, PatchError> {
    let keys = patch.path().keys();
    match keys.first() {
        Some(PathKey::Key(_)) => {}
        _ => {
            return Err(PatchError::InvalidPath {
                path: patch.path().to_string(),
                reason: "path must start with a record id",
            })
        }
    }
    let inner = &keys[1..];

    match patch {
        Patch::Put { value, .. } => put(record, inner, value),
        Patch::Update { value, .. } => update(record, inner, value),
        Patch::Insert { values, .. } => insert(record, inner, values),
        Patch::Splice { value, .. } => splice(record, inner, value),
        Patch::Del { length, .. } => delete(record, inner, *length, options.nested_delete),
        Patch::Unrecognized { action, .. } => Err(PatchError::Unrecognized(action.clone())),
    }
}

fn put(record: &mut Value, keys: &[PathKey], value: &Value) -> Result<Applied, PatchError> {
    match keys {
        [] => Ok(Applied::Materialized),
        [property] => {
            assign(record, property, value.clone(), keys)?;
            Ok(Applied::Modified)
        }
        [ancestors @ .., target, property] => {
            let container = resolve_mut(record, ancestors)?;
            let slot = match container {
                Value::Object(map) => map
                    .entry(target.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                Value::Array(items) => match target {
                    PathKey::Index(i) => {
                        let length = items.len();
                        items.get_mut(*i).ok_or_else(|| PatchError::IndexOutOfRange {
                            path: describe(&keys[..keys.len() - 1]),
                            index: *i,
                            length,
                        })?
                    }
                    PathKey::Key(_) => {
                        return Err(PatchError::TypeMismatch {
                            path: describe(ancestors),
                            expected: "object",
                            found: "array",
                        })
                    }
                },
                other => {
                    return Err(PatchError::TypeMismatch {
                        path: describe(ancestors),
                        expected: "object or array",
                        found: value_kind(other),
                    })
                }
            };
            // Merging a property into a scalar leaves just that property.
            if !slot.is_object() && !slot.is_array() {
                *slot = Value::Object(Map::new());
            }
            assign(slot, property, value.clone(), keys)?;
            Ok(Applied::Modified)
        }
    }
}

fn update(record: &mut Value, keys: &[PathKey], value: &Value) -> Result<Applied, PatchError> {
    let Some((last, ancestors)) = keys.split_last() else {
        return Err(PatchError::InvalidPath {
            path: describe(keys),
            reason: "update needs a key below the record",
        });
    };
    let parent = resolve_mut(record, ancestors)?;
    assign(parent, last, value.clone(), keys)?;
    Ok(Applied::Modified)
}

fn insert(record: &mut Value, keys: &[PathKey], values: &[Value]) -> Result<Applied, PatchError> {
    let (target, index) = sequence_target(keys, "insert")?;
    let slot = resolve_mut(record, target)?;
    let items = slot.as_array().ok_or_else(|| PatchError::TypeMismatch {
        path: describe(target),
        expected: "array",
        found: value_kind(slot),
    })?;
    if index > items.len() {
        return Err(PatchError::IndexOutOfRange {
            path: describe(keys),
            index,
            length: items.len(),
        });
    }
    // Replace the array rather than editing it in place.
    let mut next = items.clone();
    next.splice(index..index, values.iter().cloned());
    *slot = Value::Array(next);
    Ok(Applied::Modified)
}

fn splice(record: &mut Value, keys: &[PathKey], value: &Value) -> Result<Applied, PatchError> {
    let (target, index) = sequence_target(keys, "splice")?;
    if index != 0 {
        return Err(PatchError::Unsupported(format!(
            "splice at offset {} of {}",
            index,
            describe(target)
        )));
    }
    let Some((last, ancestors)) = target.split_last() else {
        return Err(PatchError::InvalidPath {
            path: describe(keys),
            reason: "splice needs a target below the record",
        });
    };
    let parent = resolve_mut(record, ancestors)?;
    assign(parent, last, value.clone(), target)?;
    Ok(Applied::Modified)
}

fn delete(
    record: &mut Value,
    keys: &[PathKey],
    length: usize,
    policy: NestedDelete,
) -> Result<Applied, PatchError> {
    let Some((last, ancestors)) = keys.split_last() else {
        return Ok(Applied::RemoveRecord);
    };
    if policy == NestedDelete::Reject {
        return Err(PatchError::Unsupported(format!(
            "nested delete at {}",
            describe(keys)
        )));
    }
    let parent = resolve_mut(record, ancestors)?;
    match (parent, last) {
        (Value::Object(map), key) => {
            map.remove(&key.to_string());
        }
        (Value::Array(items), PathKey::Index(i)) => {
            let end = i.saturating_add(length);
            if end > items.len() {
                return Err(PatchError::IndexOutOfRange {
                    path: describe(keys),
                    index: end.saturating_sub(1),
                    length: items.len(),
                });
            }
            items.drain(*i..end);
        }
        (other, _) => {
            return Err(PatchError::TypeMismatch {
                path: describe(ancestors),
                expected: "object",
                found: value_kind(other),
            })
        }
    }
    Ok(Applied::Modified)
}

/// Split `[..target, index]` for sequence operations.
fn sequence_target<'k>(
    keys: &'k [PathKey],
    action: &'static str,
) -> Result<(&'k [PathKey], usize), PatchError> {
    match keys.split_last() {
        Some((PathKey::Index(index), target)) if !target.is_empty() => Ok((target, *index)),
        _ => Err(PatchError::InvalidPath {
            path: describe(keys),
            reason: match action {
                "insert" => "insert needs an array path ending in an index",
                _ => "splice needs a sequence path ending in an offset",
            },
        }),
    }
}

/// Write `value` under `key` in a container: object keys are inserted or
/// overwritten, array indices are overwritten or appended at the end.
fn assign(
    container: &mut Value,
    key: &PathKey,
    value: Value,
    keys: &[PathKey],
) -> Result<(), PatchError> {
    match (container, key) {
        (Value::Object(map), key) => {
            map.insert(key.to_string(), value);
        }
        (Value::Array(items), PathKey::Index(i)) => {
            if *i < items.len() {
                items[*i] = value;
            } else if *i == items.len() {
                items.push(value);
            } else {
                return Err(PatchError::IndexOutOfRange {
                    path: describe(keys),
                    index: *i,
                    length: items.len(),
                });
            }
        }
        (other, key) => {
            return Err(PatchError::TypeMismatch {
                path: describe(keys),
                expected: match key {
                    PathKey::Index(_) => "array or object",
                    PathKey::Key(_) => "object",
                },
                found: value_kind(other),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use serde_json::json;

    fn apply(record: &mut Value, patch: Patch) -> Result<Applied, PatchError> {
        apply_patch(record, &patch, &ApplyOptions::default())
    }

    #[test]
    fn test_put_record_is_materialization() {
        let mut record = json!({"id": "shape:a"});
        let applied = apply(&mut record, Patch::put(Path::parse("shape:a"), json!({}))).unwrap();
        assert_eq!(applied, Applied::Materialized);
        assert_eq!(record, json!({"id": "shape:a"}));
    }

    #[test]
    fn test_put_at_root() {
        let mut record = json!({"id": "shape:a", "x": 1});
        apply(&mut record, Patch::put(Path::parse("shape:a.x"), 5)).unwrap();
        apply(&mut record, Patch::put(Path::parse("shape:a.props"), json!({}))).unwrap();
        assert_eq!(record, json!({"id": "shape:a", "x": 5, "props": {}}));
    }

    #[test]
    fn test_put_nested_merges_target() {
        let mut record = json!({"id": "shape:a", "props": {"w": 10, "h": 20}});
        apply(&mut record, Patch::put(Path::parse("shape:a.props.w"), 99)).unwrap();
        assert_eq!(record["props"], json!({"w": 99, "h": 20}));

        // An absent target becomes a fresh object.
        apply(&mut record, Patch::put(Path::parse("shape:a.meta.tag"), "x")).unwrap();
        assert_eq!(record["meta"], json!({"tag": "x"}));
    }

    #[test]
    fn test_put_nested_array_element() {
        let mut record = json!({"id": "shape:a", "points": [1, 2]});
        apply(&mut record, Patch::put(Path::parse("shape:a.points.1"), 7)).unwrap();
        apply(&mut record, Patch::put(Path::parse("shape:a.points.2"), 8)).unwrap();
        assert_eq!(record["points"], json!([1, 7, 8]));
    }

    #[test]
    fn test_put_missing_ancestor_is_fatal() {
        let mut record = json!({"id": "shape:a"});
        let err = apply(&mut record, Patch::put(Path::parse("shape:a.props.style.color"), "red"))
            .unwrap_err();
        assert!(matches!(err, PatchError::MissingAncestor { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_update() {
        let mut record = json!({"id": "shape:a", "props": {"w": 10}});
        apply(&mut record, Patch::update(Path::parse("shape:a.props.w"), 11)).unwrap();
        assert_eq!(record["props"]["w"], json!(11));

        let err = apply(&mut record, Patch::update(Path::parse("shape:a.nope.w"), 1)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_insert_two_values_at_front() {
        let mut record = json!({"id": "shape:a", "xs": ["a", "b", "c"]});
        apply(
            &mut record,
            Patch::insert(Path::parse("shape:a.xs.0"), vec![json!("n1"), json!("n2")]),
        )
        .unwrap();
        assert_eq!(record["xs"], json!(["n1", "n2", "a", "b", "c"]));
    }

    #[test]
    fn test_insert_into_non_array() {
        let mut record = json!({"id": "shape:a", "xs": {"a": 1}});
        let err = apply(
            &mut record,
            Patch::insert(Path::parse("shape:a.xs.0"), vec![json!(1)]),
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::TypeMismatch { expected: "array", .. }));
    }

    #[test]
    fn test_splice_at_zero_replaces() {
        let mut record = json!({"id": "shape:a", "props": {"text": "old"}});
        apply(&mut record, Patch::splice(Path::parse("shape:a.props.text.0"), "new")).unwrap();
        assert_eq!(record["props"]["text"], json!("new"));
    }

    #[test]
    fn test_splice_at_offset_is_unsupported() {
        let mut record = json!({"id": "shape:a", "props": {"text": "old"}});
        let before = record.clone();
        let err = apply(&mut record, Patch::splice(Path::parse("shape:a.props.text.2"), "x"))
            .unwrap_err();
        assert!(matches!(err, PatchError::Unsupported(_)));
        assert!(!err.is_fatal());
        assert_eq!(record, before);
    }

    #[test]
    fn test_delete_record() {
        let mut record = json!({"id": "shape:a"});
        assert_eq!(
            apply(&mut record, Patch::del(Path::parse("shape:a"))).unwrap(),
            Applied::RemoveRecord
        );
    }

    #[test]
    fn test_nested_delete_policies() {
        let mut record = json!({"id": "shape:a", "meta": {"a": 1, "b": 2}, "xs": [1, 2, 3, 4]});
        let before = record.clone();

        let err = apply(&mut record, Patch::del(Path::parse("shape:a.meta.a"))).unwrap_err();
        assert!(matches!(err, PatchError::Unsupported(_)));
        assert_eq!(record, before);

        let remove = ApplyOptions {
            nested_delete: NestedDelete::Remove,
        };
        apply_patch(&mut record, &Patch::del(Path::parse("shape:a.meta.a")), &remove).unwrap();
        apply_patch(
            &mut record,
            &Patch::Del {
                path: Path::parse("shape:a.xs.1"),
                length: 2,
            },
            &remove,
        )
        .unwrap();
        assert_eq!(record["meta"], json!({"b": 2}));
        assert_eq!(record["xs"], json!([1, 4]));
    }

    #[test]
    fn test_unrecognized() {
        let mut record = json!({"id": "shape:a"});
        let patch = Patch::Unrecognized {
            action: "mark".to_string(),
            path: Path::parse("shape:a.text"),
        };
        let err = apply(&mut record, patch).unwrap_err();
        assert_eq!(err, PatchError::Unrecognized("mark".to_string()));
        assert!(!err.is_fatal());
    }
}
