//! The document handle abstraction the bridge is written against.

use crate::error::Result;
use crate::transaction::Transaction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{Patch, RecordId};
use ulid::Ulid;

/// The document's full state: record id to record tree.
pub type DocSnapshot = BTreeMap<RecordId, Value>;

/// Marks which party opened a transaction. Change events carry the origin of
/// the transaction that produced them, so a writer can recognize its own
/// changes coming back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin(pub Ulid);

impl Origin {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Patches produced by one committed transaction, local or remote.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    /// Position of this event in the handle's local event sequence.
    pub seq: u64,
    pub origin: Option<Origin>,
    pub patches: Vec<Patch>,
}

/// Result of a call to [`DocHandle::change`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeReceipt {
    /// Sequence number of the emitted event; `None` when nothing changed.
    pub seq: Option<u64>,
    pub patch_count: usize,
}

impl ChangeReceipt {
    pub fn is_empty(&self) -> bool {
        self.patch_count == 0
    }
}

/// Whether the document's content is available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyState {
    Loading,
    Ready,
    Unavailable,
}

/// Coarse connectivity of the handle to its peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connection {
    Online,
    Offline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleStatus {
    pub ready: ReadyState,
    pub connection: Connection,
}

/// Identifies a registered change handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

/// Callback invoked with every committed change.
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Mutator run inside [`DocHandle::change`]. Returning an error discards
/// every write it made.
pub type Mutator<'a> = dyn FnMut(&mut Transaction) -> Result<()> + 'a;

/// A handle to a replicated document.
#[async_trait]
pub trait DocHandle: Send + Sync {
    /// Run `mutator` as one transaction. Handlers registered with
    /// [`DocHandle::on_change`] see the resulting event, stamped with
    /// `origin`, before this returns.
    fn change(&self, origin: Option<Origin>, mutator: &mut Mutator<'_>) -> Result<ChangeReceipt>;

    fn on_change(&self, handler: ChangeHandler) -> HandlerId;

    fn off_change(&self, id: HandlerId) -> bool;

    /// The full document once it is ready.
    async fn doc(&self) -> Result<DocSnapshot>;

    /// The full document if it is ready now.
    fn doc_sync(&self) -> Option<DocSnapshot>;

    /// Wait until the document is ready. Fails if it becomes unavailable.
    async fn when_ready(&self) -> Result<()>;

    fn status(&self) -> HandleStatus;
}
