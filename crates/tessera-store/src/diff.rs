//! Record-level change sets and how consecutive ones combine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::{Record, RecordId, RecordScope};

/// Which side of the bridge a change batch came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeSource {
    /// A local edit.
    User,
    /// A change merged in from elsewhere (the document, a peer's presence).
    Remote,
}

/// The net effect of a batch of store mutations.
///
/// A record id appears in at most one of the three maps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordsDiff {
    pub added: BTreeMap<RecordId, Record>,
    /// `(from, to)` pairs.
    pub updated: BTreeMap<RecordId, (Record, Record)>,
    pub removed: BTreeMap<RecordId, Record>,
}

impl RecordsDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Number of records touched.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    /// Record that `next` replaced `previous` (or was created when `None`).
    pub fn record_put(&mut self, previous: Option<Record>, next: Record) {
        let id = next.id().clone();
        let mut single = RecordsDiff::new();
        match previous {
            Some(previous) if previous == next => return,
            Some(previous) => {
                single.updated.insert(id, (previous, next));
            }
            None => {
                single.added.insert(id, next);
            }
        }
        self.squash(single);
    }

    /// Record that `previous` was removed.
    pub fn record_remove(&mut self, previous: Record) {
        let mut single = RecordsDiff::new();
        single.removed.insert(previous.id().clone(), previous);
        self.squash(single);
    }

    /// Fold a later diff into this one so the result describes both.
    pub fn squash(&mut self, next: RecordsDiff) {
        for (id, record) in next.added {
            match self.removed.remove(&id) {
                Some(old) if old == record => {}
                Some(old) => {
                    self.updated.insert(id, (old, record));
                }
                None => {
                    self.added.insert(id, record);
                }
            }
        }

        for (id, (from, to)) in next.updated {
            if let Some(added) = self.added.get_mut(&id) {
                *added = to;
                continue;
            }
            let unchanged = match self.updated.get_mut(&id) {
                Some((first, last)) => {
                    *last = to;
                    first == last
                }
                None => {
                    self.updated.insert(id.clone(), (from, to));
                    false
                }
            };
            if unchanged {
                self.updated.remove(&id);
            }
        }

        for (id, record) in next.removed {
            if self.added.remove(&id).is_some() {
                continue;
            }
            match self.updated.remove(&id) {
                Some((from, _)) => {
                    self.removed.insert(id, from);
                }
                None => {
                    self.removed.insert(id, record);
                }
            }
        }
    }

    /// The part of this diff whose records satisfy `keep`.
    pub fn filter(&self, mut keep: impl FnMut(&RecordId) -> bool) -> RecordsDiff {
        RecordsDiff {
            added: self
                .added
                .iter()
                .filter(|(id, _)| keep(id))
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
            updated: self
                .updated
                .iter()
                .filter(|(id, _)| keep(id))
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
            removed: self
                .removed
                .iter()
                .filter(|(id, _)| keep(id))
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
        }
    }

    /// The part of this diff in a single record scope.
    pub fn in_scope(&self, scope: RecordScope) -> RecordsDiff {
        self.filter(|id| id.scope() == scope)
    }

    /// Ids touched by this diff, in order.
    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.added
            .keys()
            .chain(self.updated.keys())
            .chain(self.removed.keys())
    }
}

/// A batch of changes delivered to store listeners.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreChange {
    pub source: ChangeSource,
    pub changes: RecordsDiff,
}
