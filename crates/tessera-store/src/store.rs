//! The record store and its listener registry.

use crate::diff::{ChangeSource, RecordsDiff, StoreChange};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tessera_core::{Record, RecordId, RecordScope};
use tracing::trace;

/// Identifies a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Which change batches a listener wants to see.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListenFilter {
    /// Only batches from this source; all sources when `None`.
    pub source: Option<ChangeSource>,
    /// Only records in this scope; all scopes when `None`.
    pub scope: Option<RecordScope>,
}

impl ListenFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: ChangeSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn scope(mut self, scope: RecordScope) -> Self {
        self.scope = Some(scope);
        self
    }

    fn select(&self, change: &StoreChange) -> Option<StoreChange> {
        if self.source.is_some_and(|source| source != change.source) {
            return None;
        }
        let changes = match self.scope {
            Some(scope) => change.changes.in_scope(scope),
            None => change.changes.clone(),
        };
        (!changes.is_empty()).then_some(StoreChange {
            source: change.source,
            changes,
        })
    }
}

/// Callback invoked with each matching change batch.
pub type StoreListener = Arc<dyn Fn(&StoreChange) + Send + Sync>;

struct ListenerEntry {
    id: ListenerId,
    filter: ListenFilter,
    active: AtomicBool,
    callback: StoreListener,
}

#[derive(Default)]
struct RemoteScope {
    depth: usize,
    pending: RecordsDiff,
}

struct StoreInner {
    records: RwLock<BTreeMap<RecordId, Record>>,
    listeners: RwLock<Vec<Arc<ListenerEntry>>>,
    /// Open remote merge scopes, keyed by the thread that opened them.
    remote: Mutex<HashMap<ThreadId, RemoteScope>>,
    next_listener: AtomicU64,
}

/// A keyed record collection shared by the editor and the sync bridge.
///
/// Cloning a `Store` yields another handle to the same records. Every
/// mutation produces a [`RecordsDiff`]; listeners run after the locks are
/// released, so they may write to the store themselves.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                records: RwLock::new(BTreeMap::new()),
                listeners: RwLock::new(Vec::new()),
                remote: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Create a store holding `records`, without notifying anyone.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut map = store.inner.records.write();
            for record in records {
                map.insert(record.id().clone(), record);
            }
        }
        store
    }

    /// Insert or replace records. A record equal to the stored one is not a change.
    pub fn put(&self, records: impl IntoIterator<Item = Record>) {
        let mut diff = RecordsDiff::new();
        {
            let mut map = self.inner.records.write();
            for record in records {
                if map.get(record.id()) == Some(&record) {
                    continue;
                }
                let previous = map.insert(record.id().clone(), record.clone());
                diff.record_put(previous, record);
            }
        }
        self.emit(diff);
    }

    /// Remove records by id. Unknown ids are ignored.
    pub fn remove<'a>(&self, ids: impl IntoIterator<Item = &'a RecordId>) {
        let mut diff = RecordsDiff::new();
        {
            let mut map = self.inner.records.write();
            for id in ids {
                if let Some(previous) = map.remove(id) {
                    diff.record_remove(previous);
                }
            }
        }
        self.emit(diff);
    }

    /// Replace every document-scope record with `records`. Session and
    /// presence records are kept.
    pub fn load_snapshot(&self, records: impl IntoIterator<Item = Record>) {
        let incoming: BTreeMap<RecordId, Record> = records
            .into_iter()
            .map(|record| (record.id().clone(), record))
            .collect();
        let stale: Vec<RecordId> = self
            .inner
            .records
            .read()
            .keys()
            .filter(|id| id.scope().is_persisted() && !incoming.contains_key(*id))
            .cloned()
            .collect();

        let mut diff = RecordsDiff::new();
        {
            let mut map = self.inner.records.write();
            for id in &stale {
                if let Some(previous) = map.remove(id) {
                    diff.record_remove(previous);
                }
            }
            for (id, record) in incoming {
                if map.get(&id) == Some(&record) {
                    continue;
                }
                let previous = map.insert(id, record.clone());
                diff.record_put(previous, record);
            }
        }
        trace!(removed = stale.len(), changed = diff.len(), "Loaded snapshot");
        self.emit(diff);
    }

    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.inner.records.read().get(id).cloned()
    }

    pub fn has(&self, id: &RecordId) -> bool {
        self.inner.records.read().contains_key(id)
    }

    /// All records, ordered by id.
    pub fn all_records(&self) -> Vec<Record> {
        self.inner.records.read().values().cloned().collect()
    }

    /// All records of one scope, ordered by id.
    pub fn records_in(&self, scope: RecordScope) -> Vec<Record> {
        self.inner
            .records
            .read()
            .values()
            .filter(|record| record.scope() == scope)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.read().is_empty()
    }

    /// Register a listener for change batches matching `filter`.
    pub fn listen<F>(&self, filter: ListenFilter, callback: F) -> ListenerId
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push(Arc::new(ListenerEntry {
            id,
            filter,
            active: AtomicBool::new(true),
            callback: Arc::new(callback),
        }));
        id
    }

    /// Remove a listener. It is not called again, even by a batch that is
    /// already being delivered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        match listeners.iter().position(|entry| entry.id == id) {
            Some(index) => {
                let entry = listeners.remove(index);
                entry.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Run `f` with every mutation it makes tagged [`ChangeSource::Remote`].
    ///
    /// Scopes nest; the changes of the outermost scope are squashed and
    /// delivered as one batch when it ends. Only writes made on the calling
    /// thread belong to the scope; other threads keep writing as
    /// [`ChangeSource::User`] while it is open.
    pub fn merge_remote_changes<R>(&self, f: impl FnOnce() -> R) -> R {
        let owner = thread::current().id();
        self.inner.remote.lock().entry(owner).or_default().depth += 1;
        let scope = RemoteScopeGuard { store: self, owner };
        let result = f();
        drop(scope);
        result
    }

    /// Whether the calling thread has a remote merge scope open.
    pub fn is_merging_remote(&self) -> bool {
        self.inner.remote.lock().contains_key(&thread::current().id())
    }

    fn emit(&self, diff: RecordsDiff) {
        if diff.is_empty() {
            return;
        }
        {
            let mut remote = self.inner.remote.lock();
            if let Some(scope) = remote.get_mut(&thread::current().id()) {
                scope.pending.squash(diff);
                return;
            }
        }
        self.dispatch(StoreChange {
            source: ChangeSource::User,
            changes: diff,
        });
    }

    fn dispatch(&self, change: StoreChange) {
        trace!(
            source = ?change.source,
            records = change.changes.len(),
            "Dispatching store change"
        );
        let listeners: Vec<Arc<ListenerEntry>> = self.inner.listeners.read().clone();
        for entry in listeners {
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            if let Some(selected) = entry.filter.select(&change) {
                (entry.callback)(&selected);
            }
        }
    }
}

struct RemoteScopeGuard<'a> {
    store: &'a Store,
    owner: ThreadId,
}

impl Drop for RemoteScopeGuard<'_> {
    fn drop(&mut self) {
        let pending = {
            let mut remote = self.store.inner.remote.lock();
            let Some(scope) = remote.get_mut(&self.owner) else {
                return;
            };
            scope.depth = scope.depth.saturating_sub(1);
            if scope.depth > 0 {
                return;
            }
            match remote.remove(&self.owner) {
                Some(scope) => scope.pending,
                None => return,
            }
        };
        if !pending.is_empty() {
            self.store.dispatch(StoreChange {
                source: ChangeSource::Remote,
                changes: pending,
            });
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("records", &self.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
