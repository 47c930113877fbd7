//! Transactions against a document snapshot.
//!
//! Every write updates the working state and records the structural patches
//! a replicated document would report for it:
//!
//! | write | patches |
//! |---|---|
//! | new record or composite value | `put path {}` / `put path []`, then its children |
//! | scalar over an existing scalar | `update path value` |
//! | array growth | `insert path.index values` |
//! | truncation, key or record removal | `del path` (with `length`) |

use crate::error::{DocError, Result};
use crate::handle::DocSnapshot;
use serde_json::{Map, Value};
use tessera_core::{resolve, resolve_mut, value_kind, Patch, PatchError, Path, PathKey, Record, RecordId};

/// A set of writes against a copy of the document.
#[derive(Debug)]
pub struct Transaction {
    state: DocSnapshot,
    patches: Vec<Patch>,
}

impl Transaction {
    pub(crate) fn new(state: DocSnapshot) -> Self {
        Self {
            state,
            patches: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (DocSnapshot, Vec<Patch>) {
        (self.state, self.patches)
    }

    /// Patches recorded so far.
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn get(&self, id: &RecordId) -> Option<&Value> {
        self.state.get(id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.state.contains_key(id)
    }

    pub fn record_ids(&self) -> impl Iterator<Item = &RecordId> {
        self.state.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// The value at a full document path.
    pub fn get_at(&self, path: &Path) -> Option<&Value> {
        let id = path.record_id().ok()?;
        let record = self.state.get(&id)?;
        resolve(record, &path.keys()[1..]).ok()
    }

    /// Assign a whole record, replacing any existing one.
    pub fn put_record(&mut self, record: &Record) -> Result<()> {
        self.put_record_value(record.id(), record.to_value())
    }

    fn put_record_value(&mut self, id: &RecordId, value: Value) -> Result<()> {
        if !value.is_object() {
            return Err(DocError::NotAnObject(id.clone()));
        }
        if self.state.remove(id).is_some() {
            self.patches.push(Patch::del(Path::record(id)));
        }
        creation_patches(Path::record(id), &value, &mut self.patches);
        self.state.insert(id.clone(), value);
        Ok(())
    }

    /// Remove a whole record. Removing an absent record is not a change.
    pub fn delete_record(&mut self, id: &RecordId) {
        if self.state.remove(id).is_some() {
            self.patches.push(Patch::del(Path::record(id)));
        }
    }

    /// Assign `value` at `path`. The parent must exist; an array index may
    /// address an element or the position just past the end.
    pub fn put(&mut self, path: &Path, value: Value) -> Result<()> {
        let id = path.record_id()?;
        let keys = &path.keys()[1..];
        let Some((last, ancestors)) = keys.split_last() else {
            return self.put_record_value(&id, value);
        };
        let record = self.state.get_mut(&id).ok_or_else(|| PatchError::MissingAncestor {
            path: id.to_string(),
        })?;
        let parent = resolve_mut(record, ancestors)?;

        let mut patches = Vec::new();
        match (parent, last) {
            (Value::Object(map), key) => {
                let key = key.to_string();
                let overwrite_scalar = map.get(&key).is_some_and(is_scalar) && is_scalar(&value);
                if map.get(&key) == Some(&value) {
                    return Ok(());
                }
                if overwrite_scalar {
                    patches.push(Patch::update(path.clone(), value.clone()));
                } else {
                    creation_patches(path.clone(), &value, &mut patches);
                }
                map.insert(key, value);
            }
            (Value::Array(items), PathKey::Index(index)) => {
                let index = *index;
                if index == items.len() {
                    patches.push(Patch::insert(path.clone(), vec![value.clone()]));
                    items.push(value);
                } else if let Some(slot) = items.get_mut(index) {
                    if *slot == value {
                        return Ok(());
                    }
                    if is_scalar(slot) && is_scalar(&value) {
                        patches.push(Patch::update(path.clone(), value.clone()));
                    } else {
                        creation_patches(path.clone(), &value, &mut patches);
                    }
                    *slot = value;
                } else {
                    return Err(PatchError::IndexOutOfRange {
                        path: path.to_string(),
                        index,
                        length: items.len(),
                    }
                    .into());
                }
            }
            (other, _) => {
                return Err(PatchError::TypeMismatch {
                    path: path.to_string(),
                    expected: "object",
                    found: value_kind(other),
                }
                .into())
            }
        }
        self.patches.extend(patches);
        Ok(())
    }

    /// Insert `values` into the array at `path`, starting at `index`.
    pub fn insert(&mut self, path: &Path, index: usize, values: Vec<Value>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let items = self.array_mut(path)?;
        if index > items.len() {
            return Err(PatchError::IndexOutOfRange {
                path: path.to_string(),
                index,
                length: items.len(),
            }
            .into());
        }
        items.splice(index..index, values.iter().cloned());
        self.patches.push(Patch::insert(path.child(index), values));
        Ok(())
    }

    /// Shorten the array at `path` to `len` elements.
    pub fn truncate(&mut self, path: &Path, len: usize) -> Result<()> {
        let items = self.array_mut(path)?;
        let current = items.len();
        if current <= len {
            return Ok(());
        }
        items.truncate(len);
        self.patches.push(Patch::Del {
            path: path.child(len),
            length: current - len,
        });
        Ok(())
    }

    /// Remove the key or array element at `path`. A one-key path removes
    /// the whole record. Removing something absent is not a change.
    pub fn delete(&mut self, path: &Path) -> Result<()> {
        let id = path.record_id()?;
        let keys = &path.keys()[1..];
        let Some((last, ancestors)) = keys.split_last() else {
            self.delete_record(&id);
            return Ok(());
        };
        let Some(record) = self.state.get_mut(&id) else {
            return Ok(());
        };
        let removed = match (resolve_mut(record, ancestors)?, last) {
            (Value::Object(map), key) => map.remove(&key.to_string()).is_some(),
            (Value::Array(items), PathKey::Index(index)) if *index < items.len() => {
                items.remove(*index);
                true
            }
            _ => false,
        };
        if removed {
            self.patches.push(Patch::del(path.clone()));
        }
        Ok(())
    }

    fn array_mut(&mut self, path: &Path) -> Result<&mut Vec<Value>> {
        let id = path.record_id()?;
        let record = self.state.get_mut(&id).ok_or_else(|| PatchError::MissingAncestor {
            path: id.to_string(),
        })?;
        match resolve_mut(record, &path.keys()[1..])? {
            Value::Array(items) => Ok(items),
            other => Err(PatchError::TypeMismatch {
                path: path.to_string(),
                expected: "array",
                found: value_kind(other),
            }
            .into()),
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !value.is_object() && !value.is_array()
}

/// Patches that build `value` from nothing at `path`.
fn creation_patches(path: Path, value: &Value, out: &mut Vec<Patch>) {
    match value {
        Value::Object(map) => {
            out.push(Patch::put(path.clone(), Value::Object(Map::new())));
            for (key, child) in map {
                creation_patches(path.child(key.as_str()), child, out);
            }
        }
        Value::Array(items) => {
            out.push(Patch::put(path.clone(), Value::Array(Vec::new())));
            if !items.is_empty() {
                out.push(Patch::insert(path.child(0usize), items.clone()));
            }
        }
        scalar => out.push(Patch::put(path, scalar.clone())),
    }
}
