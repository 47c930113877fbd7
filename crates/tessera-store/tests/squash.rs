//! Property tests for squashed change batches.

use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{Record, RecordId};
use tessera_store::{ChangeSource, ListenFilter, RecordsDiff, Store};

#[derive(Clone, Debug)]
enum Op {
    Put(u8, i64),
    Remove(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, 0i64..3).prop_map(|(id, x)| Op::Put(id, x)),
        (0u8..4).prop_map(Op::Remove),
    ]
}

fn id(n: u8) -> RecordId {
    RecordId::new(format!("shape:{}", n))
}

fn contents(store: &Store) -> BTreeMap<RecordId, Record> {
    store
        .all_records()
        .into_iter()
        .map(|record| (record.id().clone(), record))
        .collect()
}

fn replay(mut state: BTreeMap<RecordId, Record>, diff: &RecordsDiff) -> BTreeMap<RecordId, Record> {
    for id in diff.removed.keys() {
        state.remove(id);
    }
    for (id, (_, to)) in &diff.updated {
        state.insert(id.clone(), to.clone());
    }
    for (id, record) in &diff.added {
        state.insert(id.clone(), record.clone());
    }
    state
}

proptest! {
    #[test]
    fn remote_batch_is_the_net_change(
        initial in prop::collection::vec((0u8..4, 0i64..3), 0..4),
        ops in prop::collection::vec(op_strategy(), 0..16),
    ) {
        let store = Store::with_records(
            initial.into_iter().map(|(n, x)| Record::new(id(n)).with("x", x)),
        );
        let before = contents(&store);
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        store.listen(ListenFilter::all(), move |change| {
            sink.lock().push((change.source, change.changes.clone()))
        });

        store.merge_remote_changes(|| {
            for op in &ops {
                match op {
                    Op::Put(n, x) => store.put([Record::new(id(*n)).with("x", *x)]),
                    Op::Remove(n) => store.remove([id(*n)].iter()),
                }
            }
        });

        let after = contents(&store);
        let batches = batches.lock();
        if before == after {
            prop_assert!(batches.is_empty());
        } else {
            prop_assert_eq!(batches.len(), 1);
            let (source, diff) = &batches[0];
            prop_assert_eq!(*source, ChangeSource::Remote);
            prop_assert_eq!(replay(before.clone(), diff), after.clone());
            for id in diff.ids() {
                prop_assert_ne!(before.get(id), after.get(id));
            }
        }
    }
}
