//! The ephemeral side channel peers use to share presence.
//!
//! Nothing sent here is ever written into the replicated document.

use crate::presence::PeerPresence;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Messages exchanged on the awareness channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AwarenessMessage {
    /// A peer's full current presence.
    State { peer: String, state: PeerPresence },
    /// A peer is going away.
    Leave { peer: String },
}

impl AwarenessMessage {
    /// The peer that sent this message.
    pub fn peer(&self) -> &str {
        match self {
            AwarenessMessage::State { peer, .. } | AwarenessMessage::Leave { peer } => peer,
        }
    }
}

/// Identifies a channel subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback invoked with every message from another peer.
pub type AwarenessHandler = Arc<dyn Fn(&AwarenessMessage) + Send + Sync>;

/// A broadcast channel for presence messages.
pub trait AwarenessChannel: Send + Sync {
    /// Deliver `message` to every subscriber except its sender.
    fn broadcast(&self, message: AwarenessMessage);

    /// Subscribe on behalf of `peer`. Messages sent by `peer` itself are not
    /// delivered.
    fn subscribe(&self, peer: &str, handler: AwarenessHandler) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

struct Subscriber {
    id: SubscriptionId,
    peer: String,
    handler: AwarenessHandler,
}

/// In-memory awareness channel shared by every peer in a process.
#[derive(Clone, Default)]
pub struct AwarenessHub {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
}

impl AwarenessHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Messages broadcast so far.
    pub fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl AwarenessChannel for AwarenessHub {
    fn broadcast(&self, message: AwarenessMessage) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        let handlers: Vec<AwarenessHandler> = self
            .subscribers
            .read()
            .iter()
            .filter(|subscriber| subscriber.peer != message.peer())
            .map(|subscriber| subscriber.handler.clone())
            .collect();
        trace!(peer = message.peer(), receivers = handlers.len(), "Broadcasting awareness message");
        for handler in handlers {
            handler(&message);
        }
    }

    fn subscribe(&self, peer: &str, handler: AwarenessHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Subscriber {
            id,
            peer: peer.to_string(),
            handler,
        });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }
}
