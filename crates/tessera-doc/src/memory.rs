//! In-memory document replicas for testing and simulation.
//!
//! Replicas forward every committed patch batch to the replicas they are
//! connected to, which apply it path by path. Writes to distinct paths
//! therefore converge; this is not a conflict-resolving CRDT.

use crate::error::{DocError, Result};
use crate::handle::{
    ChangeEvent, ChangeHandler, ChangeReceipt, Connection, DocHandle, DocSnapshot, HandleStatus,
    HandlerId, Mutator, Origin, ReadyState,
};
use crate::transaction::Transaction;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tessera_core::{apply_patch, Applied, ApplyOptions, NestedDelete, Patch, PatchError};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// A committed batch travelling between replicas.
#[derive(Clone, Debug)]
struct Batch {
    origin: Option<Origin>,
    patches: Vec<Patch>,
}

struct HandleInner {
    name: String,
    state: RwLock<DocSnapshot>,
    seq: AtomicU64,
    in_flight: AtomicBool,
    handlers: RwLock<Vec<(HandlerId, ChangeHandler)>>,
    next_handler: AtomicU64,
    ready: watch::Sender<ReadyState>,
    connection: RwLock<Connection>,
    peers: RwLock<Vec<Weak<HandleInner>>>,
    outbox: Mutex<Vec<Batch>>,
    inbox: Mutex<Vec<Batch>>,
}

/// An in-memory document replica.
#[derive(Clone)]
pub struct MemoryDocHandle {
    inner: Arc<HandleInner>,
}

impl MemoryDocHandle {
    /// Create a ready replica with an empty document.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), DocSnapshot::new(), ReadyState::Ready)
    }

    /// Create a ready replica holding `snapshot`.
    pub fn with_snapshot(name: impl Into<String>, snapshot: DocSnapshot) -> Self {
        Self::build(name.into(), snapshot, ReadyState::Ready)
    }

    /// Create a replica whose content has not arrived yet.
    pub fn loading(name: impl Into<String>) -> Self {
        Self::build(name.into(), DocSnapshot::new(), ReadyState::Loading)
    }

    fn build(name: String, snapshot: DocSnapshot, ready: ReadyState) -> Self {
        let (ready, _) = watch::channel(ready);
        Self {
            inner: Arc::new(HandleInner {
                name,
                state: RwLock::new(snapshot),
                seq: AtomicU64::new(1),
                in_flight: AtomicBool::new(false),
                handlers: RwLock::new(Vec::new()),
                next_handler: AtomicU64::new(1),
                ready,
                connection: RwLock::new(Connection::Online),
                peers: RwLock::new(Vec::new()),
                outbox: Mutex::new(Vec::new()),
                inbox: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Finish loading with `snapshot` and wake everyone waiting for it.
    pub fn finish_loading(&self, snapshot: DocSnapshot) {
        *self.inner.state.write() = snapshot;
        self.inner.ready.send_replace(ReadyState::Ready);
    }

    pub fn mark_unavailable(&self) {
        self.inner.ready.send_replace(ReadyState::Unavailable);
    }

    /// Connect two replicas to each other.
    pub fn connect_to(&self, other: &MemoryDocHandle) {
        self.inner.peers.write().push(Arc::downgrade(&other.inner));
        other.inner.peers.write().push(Arc::downgrade(&self.inner));
    }

    pub fn connection(&self) -> Connection {
        *self.inner.connection.read()
    }

    /// Switch connectivity. Coming back online first applies what arrived
    /// while offline, then forwards what was written while offline.
    pub fn set_connection(&self, connection: Connection) {
        let previous = std::mem::replace(&mut *self.inner.connection.write(), connection);
        if previous == connection || connection == Connection::Offline {
            debug!(replica = %self.inner.name, ?connection, "Connection changed");
            return;
        }

        let received = std::mem::take(&mut *self.inner.inbox.lock());
        let written = std::mem::take(&mut *self.inner.outbox.lock());
        debug!(
            replica = %self.inner.name,
            received = received.len(),
            written = written.len(),
            "Back online"
        );
        for batch in received {
            self.inner.receive(batch);
        }
        for batch in written {
            self.inner.forward(&batch);
        }
    }

    pub fn go_offline(&self) {
        self.set_connection(Connection::Offline);
    }

    pub fn go_online(&self) {
        self.set_connection(Connection::Online);
    }

    /// Batches written while offline and not yet forwarded.
    pub fn pending_outgoing(&self) -> usize {
        self.inner.outbox.lock().len()
    }

    /// The current document regardless of readiness.
    pub fn snapshot(&self) -> DocSnapshot {
        self.inner.state.read().clone()
    }

    fn ready_state(&self) -> ReadyState {
        *self.inner.ready.borrow()
    }
}

impl HandleInner {
    fn dispatch(&self, origin: Option<Origin>, patches: Vec<Patch>) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let event = ChangeEvent {
            seq,
            origin,
            patches,
        };
        let handlers: Vec<ChangeHandler> = self
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(&event);
        }
        seq
    }

    fn forward(&self, batch: &Batch) {
        if *self.connection.read() == Connection::Offline {
            self.outbox.lock().push(batch.clone());
            return;
        }
        let peers: Vec<Arc<HandleInner>> = self.peers.read().iter().filter_map(Weak::upgrade).collect();
        for peer in peers {
            if *peer.connection.read() == Connection::Offline {
                peer.inbox.lock().push(batch.clone());
            } else {
                peer.receive(batch.clone());
            }
        }
    }

    /// Apply a batch from another replica and report it to local handlers.
    fn receive(&self, batch: Batch) {
        let options = ApplyOptions {
            nested_delete: NestedDelete::Remove,
        };
        {
            let mut state = self.state.write();
            for patch in &batch.patches {
                if let Err(err) = apply_remote(&mut state, patch, &options) {
                    warn!(replica = %self.name, action = patch.action(), path = %patch.path(), error = %err, "Dropped remote patch");
                }
            }
        }
        trace!(replica = %self.name, patches = batch.patches.len(), "Applied remote batch");
        self.dispatch(batch.origin, batch.patches);
    }
}

fn apply_remote(state: &mut DocSnapshot, patch: &Patch, options: &ApplyOptions) -> std::result::Result<(), PatchError> {
    let id = patch.record_id()?;
    if patch.path().len() == 1 {
        match patch {
            Patch::Put { value, .. } => {
                let mut record = match value {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                record.entry("id").or_insert_with(|| Value::String(id.to_string()));
                state.insert(id, Value::Object(record));
            }
            Patch::Del { .. } => {
                state.remove(&id);
            }
            _ => return Err(PatchError::Unsupported(format!("{} on a whole record", patch.action()))),
        }
        return Ok(());
    }
    let record = state.get_mut(&id).ok_or_else(|| PatchError::MissingAncestor { path: id.to_string() })?;
    match apply_patch(record, patch, options)? {
        Applied::RemoveRecord => {
            state.remove(&id);
        }
        Applied::Modified | Applied::Materialized => {}
    }
    Ok(())
}

#[async_trait]
impl DocHandle for MemoryDocHandle {
    fn change(&self, origin: Option<Origin>, mutator: &mut Mutator<'_>) -> Result<ChangeReceipt> {
        match self.ready_state() {
            ReadyState::Ready => {}
            ReadyState::Loading => return Err(DocError::NotReady),
            ReadyState::Unavailable => return Err(DocError::Unavailable),
        }
        if self.inner.in_flight.swap(true, Ordering::AcqRel) {
            return Err(DocError::TransactionInFlight);
        }

        let committed = {
            let _flight = InFlight(&self.inner.in_flight);
            let mut tx = Transaction::new(self.inner.state.read().clone());
            mutator(&mut tx)?;
            let (state, patches) = tx.into_parts();
            if !patches.is_empty() {
                *self.inner.state.write() = state;
            }
            patches
        };

        if committed.is_empty() {
            return Ok(ChangeReceipt {
                seq: None,
                patch_count: 0,
            });
        }

        let patch_count = committed.len();
        trace!(replica = %self.inner.name, patches = patch_count, ?origin, "Committed transaction");
        let seq = self.inner.dispatch(origin, committed.clone());
        self.inner.forward(&Batch {
            origin,
            patches: committed,
        });
        Ok(ChangeReceipt {
            seq: Some(seq),
            patch_count,
        })
    }

    fn on_change(&self, handler: ChangeHandler) -> HandlerId {
        let id = HandlerId(self.inner.next_handler.fetch_add(1, Ordering::Relaxed));
        self.inner.handlers.write().push((id, handler));
        id
    }

    fn off_change(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.write();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    async fn doc(&self) -> Result<DocSnapshot> {
        self.when_ready().await?;
        Ok(self.snapshot())
    }

    fn doc_sync(&self) -> Option<DocSnapshot> {
        (self.ready_state() == ReadyState::Ready).then(|| self.snapshot())
    }

    async fn when_ready(&self) -> Result<()> {
        let mut ready = self.inner.ready.subscribe();
        let state = *ready
            .wait_for(|state| *state != ReadyState::Loading)
            .await
            .map_err(|_| DocError::Unavailable)?;
        match state {
            ReadyState::Ready => Ok(()),
            _ => Err(DocError::Unavailable),
        }
    }

    fn status(&self) -> HandleStatus {
        HandleStatus {
            ready: self.ready_state(),
            connection: self.connection(),
        }
    }
}

impl std::fmt::Debug for MemoryDocHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDocHandle")
            .field("name", &self.inner.name)
            .field("records", &self.inner.state.read().len())
            .field("status", &self.status())
            .finish()
    }
}

/// Clears the in-flight flag when the transaction scope ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Create a network of fully connected replicas.
pub fn create_network(count: usize) -> Vec<MemoryDocHandle> {
    let replicas: Vec<_> = (0..count)
        .map(|i| MemoryDocHandle::new(format!("replica-{}", i)))
        .collect();

    for i in 0..count {
        for j in (i + 1)..count {
            replicas[i].connect_to(&replicas[j]);
        }
    }

    replicas
}
