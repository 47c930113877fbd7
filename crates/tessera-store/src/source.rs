//! Read-only access to records by id.

use crate::store::Store;
use std::collections::{BTreeMap, HashMap};
use tessera_core::{Record, RecordId};

/// Anything that can look up the current version of a record.
pub trait RecordSource {
    fn record(&self, id: &RecordId) -> Option<Record>;
}

impl RecordSource for Store {
    fn record(&self, id: &RecordId) -> Option<Record> {
        self.get(id)
    }
}

impl RecordSource for BTreeMap<RecordId, Record> {
    fn record(&self, id: &RecordId) -> Option<Record> {
        self.get(id).cloned()
    }
}

impl RecordSource for HashMap<RecordId, Record> {
    fn record(&self, id: &RecordId) -> Option<Record> {
        self.get(id).cloned()
    }
}

impl<S: RecordSource + ?Sized> RecordSource for &S {
    fn record(&self, id: &RecordId) -> Option<Record> {
        (**self).record(id)
    }
}
