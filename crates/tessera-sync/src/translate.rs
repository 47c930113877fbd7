//! Remote direction: document patches to record upserts and removals.

use crate::error::TranslateError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tessera_core::{apply_patch, Applied, ApplyOptions, Patch, PatchError, Record, RecordId};
use tessera_store::{RecordSource, Store};
use tracing::{debug, error, trace, warn};

/// A patch that was left out of a translation.
#[derive(Clone, Debug, PartialEq)]
pub struct Rejection {
    /// Position of the patch in its batch.
    pub index: usize,
    pub patch: Patch,
    pub error: PatchError,
}

/// The record-level effect of one patch batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Translation {
    pub upserts: Vec<Record>,
    pub removals: Vec<RecordId>,
    /// Unsupported patches, dropped individually.
    pub rejected: Vec<Rejection>,
    /// Patches with an unrecognized action.
    pub skipped: Vec<Rejection>,
}

impl Translation {
    /// Whether applying this translation would touch the store.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    /// Apply to `store` as one remote batch: upserts first, then removals.
    pub fn apply_to(&self, store: &Store) {
        if self.is_empty() {
            return;
        }
        store.merge_remote_changes(|| {
            store.put(self.upserts.iter().cloned());
            store.remove(self.removals.iter());
        });
    }
}

/// Turns ordered patch batches into record-level changes.
#[derive(Clone, Debug, Default)]
pub struct PatchTranslator {
    options: ApplyOptions,
}

impl PatchTranslator {
    pub fn new(options: ApplyOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    /// Translate `patches` against the current records in `source`.
    ///
    /// Each touched record gets a working copy, taken from `source` on first
    /// touch or started as `{"id": id}`. Removing a record drops its working
    /// copy; touching it again later in the batch starts it over from
    /// scratch.
    pub fn translate<S>(&self, patches: &[Patch], source: &S) -> Result<Translation, TranslateError>
    where
        S: RecordSource + ?Sized,
    {
        let mut working: BTreeMap<RecordId, Value> = BTreeMap::new();
        let mut removals: BTreeSet<RecordId> = BTreeSet::new();
        let mut rejected = Vec::new();
        let mut skipped = Vec::new();

        for (index, patch) in patches.iter().enumerate() {
            if let Patch::Unrecognized { action, path } = patch {
                debug!(index, action = %action, path = %path, "Skipping unrecognized patch");
                skipped.push(Rejection {
                    index,
                    patch: patch.clone(),
                    error: PatchError::Unrecognized(action.clone()),
                });
                continue;
            }

            let id = patch
                .record_id()
                .map_err(|source| violation(index, patch, source))?;

            let outcome = match working.get_mut(&id) {
                Some(record) => apply_patch(record, patch, &self.options),
                None => {
                    let mut record = if removals.contains(&id) {
                        fresh(&id)
                    } else {
                        source
                            .record(&id)
                            .map(Record::into_value)
                            .unwrap_or_else(|| fresh(&id))
                    };
                    let outcome = apply_patch(&mut record, patch, &self.options);
                    if matches!(outcome, Ok(Applied::Modified | Applied::Materialized)) {
                        removals.remove(&id);
                        working.insert(id.clone(), record);
                    }
                    outcome
                }
            };

            match outcome {
                Ok(Applied::RemoveRecord) => {
                    trace!(index, record = %id, "Record removed");
                    working.remove(&id);
                    removals.insert(id);
                }
                Ok(Applied::Modified | Applied::Materialized) => {}
                Err(err) if err.is_fatal() => {
                    error!(index, action = patch.action(), path = %patch.path(), error = %err, "Patch batch violates translation invariants");
                    return Err(violation(index, patch, err));
                }
                Err(err) => {
                    warn!(index, action = patch.action(), path = %patch.path(), error = %err, "Rejected patch");
                    rejected.push(Rejection {
                        index,
                        patch: patch.clone(),
                        error: err,
                    });
                }
            }
        }

        let upserts = working
            .into_iter()
            .map(|(id, value)| {
                Record::with_id(id.clone(), value)
                    .map_err(|source| TranslateError::InvalidRecord { id, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        trace!(
            patches = patches.len(),
            upserts = upserts.len(),
            removals = removals.len(),
            rejected = rejected.len(),
            "Translated patch batch"
        );

        Ok(Translation {
            upserts,
            removals: removals.into_iter().collect(),
            rejected,
            skipped,
        })
    }
}

fn fresh(id: &RecordId) -> Value {
    Record::new(id.clone()).into_value()
}

fn violation(index: usize, patch: &Patch, source: PatchError) -> TranslateError {
    TranslateError::InvariantViolation {
        index,
        action: patch.action().to_string(),
        path: patch.path().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::{NestedDelete, Path};

    fn source() -> BTreeMap<RecordId, Record> {
        let shape = Record::new("shape:a")
            .with("x", 0)
            .with("props", json!({"w": 10, "text": "hi", "points": ["a", "b", "c"]}));
        BTreeMap::from([(shape.id().clone(), shape)])
    }

    fn upsert<'t>(translation: &'t Translation, id: &str) -> &'t Record {
        translation
            .upserts
            .iter()
            .find(|r| r.id().as_str() == id)
            .unwrap()
    }

    #[test]
    fn test_new_record_from_puts() {
        let patches = vec![
            Patch::put(Path::parse("shape:b"), json!({})),
            Patch::put(Path::parse("shape:b.x"), 5),
            Patch::put(Path::parse("shape:b.props"), json!({})),
            Patch::put(Path::parse("shape:b.props.w"), 20),
        ];
        let translation = PatchTranslator::default().translate(&patches, &source()).unwrap();

        assert_eq!(translation.upserts.len(), 1);
        assert_eq!(
            upsert(&translation, "shape:b").to_value(),
            json!({"id": "shape:b", "x": 5, "props": {"w": 20}})
        );
    }

    #[test]
    fn test_existing_record_is_merged() {
        let patches = vec![Patch::update(Path::parse("shape:a.props.w"), 11)];
        let translation = PatchTranslator::default().translate(&patches, &source()).unwrap();

        let shape = upsert(&translation, "shape:a");
        assert_eq!(shape.get_at(Path::parse("props.w").keys()), Some(&json!(11)));
        assert_eq!(shape.get("x"), Some(&json!(0)));
    }

    #[test]
    fn test_insert_values_at_front() {
        let patches = vec![Patch::insert(
            Path::parse("shape:a.props.points.0"),
            vec![json!("n1"), json!("n2")],
        )];
        let translation = PatchTranslator::default().translate(&patches, &source()).unwrap();
        assert_eq!(
            upsert(&translation, "shape:a").get("props").unwrap()["points"],
            json!(["n1", "n2", "a", "b", "c"])
        );
    }

    #[test]
    fn test_removal_then_recreation() {
        let patches = vec![
            Patch::del(Path::parse("shape:a")),
            Patch::put(Path::parse("shape:a"), json!({})),
            Patch::put(Path::parse("shape:a.y"), 1),
        ];
        let translation = PatchTranslator::default().translate(&patches, &source()).unwrap();

        assert!(translation.removals.is_empty());
        assert_eq!(
            upsert(&translation, "shape:a").to_value(),
            json!({"id": "shape:a", "y": 1})
        );

        let removed = PatchTranslator::default()
            .translate(&[Patch::put(Path::parse("shape:a.x"), 3), Patch::del(Path::parse("shape:a"))], &source())
            .unwrap();
        assert!(removed.upserts.is_empty());
        assert_eq!(removed.removals, vec![RecordId::new("shape:a")]);
    }

    #[test]
    fn test_unsupported_splice_is_dropped_alone() {
        let patches = vec![
            Patch::splice(Path::parse("shape:a.props.text.1"), "!"),
            Patch::put(Path::parse("shape:a.x"), 7),
        ];
        let translation = PatchTranslator::default().translate(&patches, &source()).unwrap();

        assert_eq!(translation.rejected.len(), 1);
        assert_eq!(translation.rejected[0].index, 0);
        let shape = upsert(&translation, "shape:a");
        assert_eq!(shape.get("x"), Some(&json!(7)));
        assert_eq!(shape.get("props").unwrap()["text"], json!("hi"));
    }

    #[test]
    fn test_rejected_first_touch_leaves_no_upsert() {
        let patches = vec![Patch::splice(Path::parse("shape:a.props.text.1"), "!")];
        let translation = PatchTranslator::default().translate(&patches, &source()).unwrap();
        assert!(translation.is_empty());
        assert_eq!(translation.rejected.len(), 1);
    }

    #[test]
    fn test_missing_ancestor_aborts_batch() {
        let patches = vec![
            Patch::put(Path::parse("shape:a.x"), 1),
            Patch::update(Path::parse("shape:a.meta.deep.value"), 2),
        ];
        let err = PatchTranslator::default().translate(&patches, &source()).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::InvariantViolation {
                index: 1,
                source: PatchError::MissingAncestor { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_index_first_path_is_a_violation() {
        let patches = vec![Patch::put(Path::parse("0.x"), 1)];
        assert!(PatchTranslator::default().translate(&patches, &source()).is_err());
    }

    #[test]
    fn test_unrecognized_is_skipped() {
        let patches = vec![
            Patch::Unrecognized {
                action: "mark".to_string(),
                path: Path::parse("shape:a.props.text"),
            },
            Patch::put(Path::parse("shape:a.x"), 2),
        ];
        let translation = PatchTranslator::default().translate(&patches, &source()).unwrap();
        assert_eq!(translation.skipped.len(), 1);
        assert_eq!(translation.upserts.len(), 1);
    }

    #[test]
    fn test_nested_delete_policy() {
        let patches = vec![Patch::del(Path::parse("shape:a.props.w"))];
        let rejected = PatchTranslator::default().translate(&patches, &source()).unwrap();
        assert_eq!(rejected.rejected.len(), 1);

        let translator = PatchTranslator::new(ApplyOptions {
            nested_delete: NestedDelete::Remove,
        });
        let removed = translator.translate(&patches, &source()).unwrap();
        assert!(upsert(&removed, "shape:a").get("props").unwrap().get("w").is_none());
    }

    #[test]
    fn test_apply_to_store_is_one_remote_batch() {
        use parking_lot::Mutex;
        use std::sync::Arc;
        use tessera_store::{ChangeSource, ListenFilter};

        let store = Store::with_records(source().into_values());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.listen(ListenFilter::all(), move |change| sink.lock().push(change.source));

        let patches = vec![
            Patch::put(Path::parse("shape:b"), json!({})),
            Patch::del(Path::parse("shape:a")),
        ];
        let translation = PatchTranslator::default().translate(&patches, &store).unwrap();
        translation.apply_to(&store);

        assert_eq!(*seen.lock(), vec![ChangeSource::Remote]);
        assert!(store.has(&RecordId::new("shape:b")));
        assert!(!store.has(&RecordId::new("shape:a")));
    }
}
