//! A collaborative session: one store, one document, one awareness channel.

use crate::awareness::AwarenessChannel;
use crate::bridge::{BridgeStatus, Diagnostics, StoreBridge};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::presence::{
    derive_presence, now_millis, LocalAwareness, PeerPresence, PresenceDerivation, RemoteAwareness,
    UserPreferences,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::RecordScope;
use tessera_doc::DocHandle;
use tessera_store::Store;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Owns a bridge and the presence machinery around it. Closing the session
/// (or dropping it) removes every listener it registered.
pub struct Session {
    peer_id: String,
    store: Store,
    bridge: Arc<StoreBridge>,
    local: LocalAwareness,
    remote: RemoteAwareness,
    derivation: PresenceDerivation,
    pruner: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Session {
    /// Attach everything. Presence starts flowing right away; document sync
    /// starts with [`Session::load`].
    pub fn open(
        store: Store,
        handle: Arc<dyn DocHandle>,
        channel: Arc<dyn AwarenessChannel>,
        preferences: UserPreferences,
        config: SyncConfig,
    ) -> Self {
        let peer_id = preferences.id.clone();
        let initial = derive_presence(&preferences, &store.records_in(RecordScope::Session));
        let local = LocalAwareness::new(channel.clone(), initial, config.presence_frame_ms);
        let remote = RemoteAwareness::attach(channel, store.clone(), peer_id.clone(), config.presence_timeout_ms);
        let derivation = PresenceDerivation::attach(store.clone(), preferences, local.clone());
        let pruner = spawn_pruner(&local, &remote, config.presence_prune_interval_ms);
        let bridge = StoreBridge::attach(store.clone(), handle, config);

        info!(peer = %peer_id, "Session opened");
        Self {
            peer_id,
            store,
            bridge,
            local,
            remote,
            derivation,
            pruner: Mutex::new(pruner),
            closed: AtomicBool::new(false),
        }
    }

    pub async fn load(&self) -> Result<()> {
        self.bridge.load().await?;
        self.local.heartbeat();
        Ok(())
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn bridge(&self) -> &Arc<StoreBridge> {
        &self.bridge
    }

    pub fn status(&self) -> BridgeStatus {
        self.bridge.status()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.bridge.diagnostics()
    }

    pub fn local_presence(&self) -> &LocalAwareness {
        &self.local
    }

    pub fn peers(&self) -> BTreeMap<String, PeerPresence> {
        self.remote.peer_states()
    }

    pub fn remote_presence(&self) -> &RemoteAwareness {
        &self.remote
    }

    pub fn set_preferences(&self, preferences: UserPreferences) {
        self.derivation.set_preferences(preferences);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Leave the awareness channel and detach from store and document.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pruner) = self.pruner.lock().take() {
            pruner.abort();
        }
        self.derivation.detach();
        self.bridge.detach();
        self.local.leave();
        self.remote.detach();
        info!(peer = %self.peer_id, "Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Periodically re-announce the local presence and prune silent peers.
/// Nothing is spawned outside a tokio runtime or with a zero interval.
fn spawn_pruner(local: &LocalAwareness, remote: &RemoteAwareness, interval_ms: u64) -> Option<JoinHandle<()>> {
    if interval_ms == 0 {
        return None;
    }
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    let local = local.clone();
    let remote = remote.clone();
    Some(runtime.spawn(async move {
        let mut ticks = tokio::time::interval(Duration::from_millis(interval_ms));
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticks.tick().await;
        loop {
            ticks.tick().await;
            local.heartbeat();
            let pruned = remote.prune_stale(now_millis());
            if !pruned.is_empty() {
                debug!(peers = ?pruned, "Pruned silent peers");
            }
        }
    }))
}
