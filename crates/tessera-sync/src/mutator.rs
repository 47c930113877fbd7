//! Local direction: store change batches to one document transaction.
//!
//! Updated records are merged into the document field by field rather than
//! reassigned, so a concurrent remote edit to a sibling field survives.

use serde_json::{Map, Value};
use tessera_core::{Path, Record, RecordScope};
use tessera_doc::{ChangeReceipt, DocHandle, Origin, Result, Transaction};
use tessera_store::RecordsDiff;
use tracing::trace;

/// Writes store changes into a document.
pub struct OutgoingMutator;

impl OutgoingMutator {
    /// Apply the document-scope part of `changes` in a single transaction
    /// stamped with `origin`. Returns `None` when there was nothing to write.
    pub fn apply(
        changes: &RecordsDiff,
        handle: &dyn DocHandle,
        origin: Option<Origin>,
    ) -> Result<Option<ChangeReceipt>> {
        let changes = changes.in_scope(RecordScope::Document);
        if changes.is_empty() {
            return Ok(None);
        }
        trace!(
            added = changes.added.len(),
            updated = changes.updated.len(),
            removed = changes.removed.len(),
            "Writing store changes to document"
        );

        handle
            .change(origin, &mut |tx| {
                for record in changes.added.values() {
                    tx.put_record(record)?;
                }
                for (_, to) in changes.updated.values() {
                    merge_record(tx, to)?;
                }
                for id in changes.removed.keys() {
                    tx.delete_record(id);
                }
                Ok(())
            })
            .map(Some)
    }
}

/// Bring the document's copy of `record` up to date with it.
pub fn merge_record(tx: &mut Transaction, record: &Record) -> Result<()> {
    match tx.get(record.id()).cloned() {
        Some(Value::Object(current)) => {
            merge_object(tx, &Path::record(record.id()), &current, record.fields())
        }
        _ => tx.put_record(record),
    }
}

/// Keys missing from `next` are left alone.
fn merge_object(
    tx: &mut Transaction,
    path: &Path,
    current: &Map<String, Value>,
    next: &Map<String, Value>,
) -> Result<()> {
    for (key, value) in next {
        let child = path.child(key.as_str());
        match current.get(key) {
            Some(existing) => merge_value(tx, &child, existing, value)?,
            None => tx.put(&child, value.clone())?,
        }
    }
    Ok(())
}

fn merge_array(tx: &mut Transaction, path: &Path, current: &[Value], next: &[Value]) -> Result<()> {
    for (index, (existing, value)) in current.iter().zip(next).enumerate() {
        merge_value(tx, &path.child(index), existing, value)?;
    }
    if next.len() > current.len() {
        tx.insert(path, current.len(), next[current.len()..].to_vec())?;
    } else if next.len() < current.len() {
        tx.truncate(path, next.len())?;
    }
    Ok(())
}

fn merge_value(tx: &mut Transaction, path: &Path, current: &Value, next: &Value) -> Result<()> {
    match (current, next) {
        (Value::Object(current), Value::Object(next)) => merge_object(tx, path, current, next),
        (Value::Array(current), Value::Array(next)) => merge_array(tx, path, current, next),
        _ if current == next => Ok(()),
        _ => tx.put(path, next.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use tessera_core::{Patch, RecordId};
    use tessera_doc::{ChangeEvent, MemoryDocHandle};

    fn handle_with(record: &Record) -> MemoryDocHandle {
        let handle = MemoryDocHandle::new("doc");
        handle.change(None, &mut |tx| tx.put_record(record)).unwrap();
        handle
    }

    fn capture(handle: &MemoryDocHandle) -> Arc<Mutex<Vec<ChangeEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        handle.on_change(Arc::new(move |event: &ChangeEvent| sink.lock().push(event.clone())));
        seen
    }

    fn updated(from: &Record, to: &Record) -> RecordsDiff {
        let mut diff = RecordsDiff::new();
        diff.record_put(Some(from.clone()), to.clone());
        diff
    }

    #[test]
    fn test_update_touches_only_changed_fields() {
        let before = Record::new("shape:a")
            .with("x", 1)
            .with("props", json!({"w": 10, "h": 20}));
        let handle = handle_with(&before);
        let seen = capture(&handle);

        let after = before.clone().with("props", json!({"w": 15, "h": 20}));
        OutgoingMutator::apply(&updated(&before, &after), &handle, None)
            .unwrap()
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].patches,
            vec![Patch::update(Path::parse("shape:a.props.w"), 15)]
        );
    }

    #[test]
    fn test_keys_absent_from_snapshot_survive() {
        let record = Record::new("shape:a").with("x", 1);
        let handle = handle_with(&record);
        // A field written to the document by someone else.
        handle
            .change(None, &mut |tx| tx.put(&Path::parse("shape:a.remote"), json!(true)))
            .unwrap();

        let after = record.clone().with("x", 2);
        OutgoingMutator::apply(&updated(&record, &after), &handle, None).unwrap();

        assert_eq!(
            handle.snapshot()[record.id()],
            json!({"id": "shape:a", "x": 2, "remote": true})
        );
    }

    #[test]
    fn test_arrays_grow_shrink_and_recurse() {
        let before = Record::new("shape:a").with("points", json!([{"x": 0}, {"x": 1}, {"x": 2}]));
        let handle = handle_with(&before);
        let seen = capture(&handle);

        let grown = before.clone().with("points", json!([{"x": 0}, {"x": 5}, {"x": 2}, {"x": 3}]));
        OutgoingMutator::apply(&updated(&before, &grown), &handle, None).unwrap();
        let shrunk = grown.clone().with("points", json!([{"x": 0}]));
        OutgoingMutator::apply(&updated(&grown, &shrunk), &handle, None).unwrap();

        let seen = seen.lock();
        assert_eq!(
            seen[0].patches,
            vec![
                Patch::update(Path::parse("shape:a.points.1.x"), 5),
                Patch::insert(Path::parse("shape:a.points.3"), vec![json!({"x": 3})]),
            ]
        );
        assert_eq!(
            seen[1].patches,
            vec![Patch::Del {
                path: Path::parse("shape:a.points.1"),
                length: 3
            }]
        );
        assert_eq!(handle.snapshot()[before.id()]["points"], json!([{"x": 0}]));
    }

    #[test]
    fn test_kind_change_replaces_value() {
        let before = Record::new("shape:a").with("meta", json!("plain"));
        let handle = handle_with(&before);
        let after = before.clone().with("meta", json!({"tag": "x"}));

        OutgoingMutator::apply(&updated(&before, &after), &handle, None).unwrap();
        assert_eq!(handle.snapshot()[before.id()]["meta"], json!({"tag": "x"}));
    }

    #[test]
    fn test_added_removed_and_missing_updated() {
        let handle = MemoryDocHandle::new("doc");
        let mut diff = RecordsDiff::new();
        diff.record_put(None, Record::new("shape:new").with("x", 1));
        // Updated in the store but never written to the document.
        diff.record_put(Some(Record::new("shape:lost")), Record::new("shape:lost").with("y", 2));
        OutgoingMutator::apply(&diff, &handle, None).unwrap();

        let doc = handle.snapshot();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc[&RecordId::new("shape:lost")]["y"], json!(2));

        let mut removal = RecordsDiff::new();
        removal.record_remove(Record::new("shape:new"));
        OutgoingMutator::apply(&removal, &handle, None).unwrap();
        assert_eq!(handle.snapshot().len(), 1);
    }

    #[test]
    fn test_non_document_records_are_not_forwarded() {
        let handle = MemoryDocHandle::new("doc");
        let seen = capture(&handle);
        let mut diff = RecordsDiff::new();
        diff.record_put(None, Record::new("camera:page"));
        diff.record_put(None, Record::new("instance_presence:peer-1"));

        assert_eq!(OutgoingMutator::apply(&diff, &handle, None).unwrap(), None);
        assert!(seen.lock().is_empty());
    }
}
