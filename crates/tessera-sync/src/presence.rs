//! Presence: who else is here, where their cursor is, what they selected.
//!
//! The local side derives this peer's presence from the store's session
//! records and broadcasts it, throttled to one message per frame. The
//! remote side turns other peers' broadcasts into `instance_presence`
//! records in the store, merged as remote changes so they never reach the
//! replicated document.

use crate::awareness::{AwarenessChannel, AwarenessMessage, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tessera_core::{Record, RecordId, RecordScope, PRESENCE_TYPE};
use tessera_store::{ListenFilter, ListenerId, Store};
use tracing::{debug, trace};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Palette for peers that have not picked a color.
pub struct PresenceColors;

impl PresenceColors {
    pub const COLORS: [&'static str; 12] = [
        "#FF802B", "#EC5E41", "#F2555A", "#F04F88", "#E34BA9", "#BD54C6", "#9D5BD2", "#7B66DC",
        "#02B1CC", "#11B3A3", "#39B178", "#55B467",
    ];

    /// A stable color for a peer id.
    pub fn color_for_peer(peer_id: &str) -> &'static str {
        let hash: usize = peer_id.bytes().map(|b| b as usize).sum();
        Self::COLORS[hash % Self::COLORS.len()]
    }
}

/// Pointer position in page space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub rotation: f64,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            kind: "default".to_string(),
            rotation: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 1.0,
        }
    }
}

/// The state one peer shares about itself.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeerPresence {
    pub peer_id: String,
    pub user_name: String,
    pub color: String,
    pub cursor: Cursor,
    pub selected_ids: Vec<RecordId>,
    pub camera: Camera,
    pub current_page_id: Option<RecordId>,
    /// Time of the last local change, in milliseconds since the epoch.
    pub last_activity: u64,
}

impl PeerPresence {
    pub fn new(peer_id: impl Into<String>, user_name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            user_name: user_name.into(),
            color: color.into(),
            ..Default::default()
        }
    }

    pub fn record_id(&self) -> RecordId {
        RecordId::presence(&self.peer_id)
    }

    /// The `instance_presence` record standing for this peer in a store.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new(self.record_id()).with("typeName", PRESENCE_TYPE);
        if let Value::Object(fields) = serde_json::to_value(self).unwrap_or_default() {
            for (key, value) in fields {
                record.set(key, value);
            }
        }
        record
    }

    /// Equal apart from `last_activity`.
    pub fn same_state(&self, other: &PeerPresence) -> bool {
        Self {
            last_activity: other.last_activity,
            ..self.clone()
        } == *other
    }
}

/// How the local user wants to appear to others.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub id: String,
    pub name: Option<String>,
    pub color: Option<String>,
}

impl UserPreferences {
    pub const DEFAULT_NAME: &'static str = "New User";

    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(Self::DEFAULT_NAME)
    }

    pub fn resolved_color(&self) -> String {
        match &self.color {
            Some(color) => color.clone(),
            None => PresenceColors::color_for_peer(&self.id).to_string(),
        }
    }
}

fn number(record: &Record, key: &str, default: f64) -> f64 {
    record.get(key).and_then(Value::as_f64).unwrap_or(default)
}

/// Compute a peer's presence from its preferences and session records
/// (`instance`, `instance_page_state`, `camera`, `pointer`).
pub fn derive_presence(preferences: &UserPreferences, records: &[Record]) -> PeerPresence {
    let of_type = |type_name: &'static str| records.iter().filter(move |r| r.type_name() == type_name);

    let current_page_id = of_type("instance")
        .next()
        .and_then(|r| r.get("currentPageId"))
        .and_then(Value::as_str)
        .map(RecordId::new);

    let page_state = of_type("instance_page_state").find(|r| match &current_page_id {
        Some(page) => r.get("pageId").and_then(Value::as_str) == Some(page.as_str()),
        None => true,
    });
    let selected_ids = page_state
        .and_then(|r| r.get("selectedShapeIds"))
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(RecordId::new).collect())
        .unwrap_or_default();

    let page_camera = current_page_id
        .as_ref()
        .map(|page| format!("camera:{}", page))
        .and_then(|id| of_type("camera").find(|r| r.id().as_str() == id));
    let camera = page_camera
        .or_else(|| of_type("camera").next())
        .map(|r| Camera {
            x: number(r, "x", 0.0),
            y: number(r, "y", 0.0),
            z: number(r, "z", 1.0),
        })
        .unwrap_or_default();

    let cursor = of_type("pointer")
        .next()
        .map(|r| Cursor {
            x: number(r, "x", 0.0),
            y: number(r, "y", 0.0),
            ..Cursor::default()
        })
        .unwrap_or_default();

    PeerPresence {
        peer_id: preferences.id.clone(),
        user_name: preferences.display_name().to_string(),
        color: preferences.resolved_color(),
        cursor,
        selected_ids,
        camera,
        current_page_id,
        last_activity: 0,
    }
}

/// Identifies a presence observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Callback invoked whenever the local presence changes.
pub type PresenceObserver = Arc<dyn Fn(&PeerPresence) + Send + Sync>;

struct LocalInner {
    channel: Arc<dyn AwarenessChannel>,
    state: RwLock<PeerPresence>,
    observers: RwLock<Vec<(ObserverId, PresenceObserver)>>,
    next_observer: AtomicU64,
    pending: AtomicBool,
    left: AtomicBool,
    frame: Duration,
    broadcasts: AtomicU64,
}

impl LocalInner {
    /// Send the latest state if a broadcast is pending.
    fn flush(&self) {
        if !self.pending.swap(false, Ordering::AcqRel) || self.left.load(Ordering::Acquire) {
            return;
        }
        let state = self.state.read().clone();
        trace!(peer = %state.peer_id, "Broadcasting local presence");
        self.channel.broadcast(AwarenessMessage::State {
            peer: state.peer_id.clone(),
            state,
        });
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }
}

/// This peer's presence and its throttled broadcast.
///
/// Broadcasts are trailing-edge: the first change in a frame schedules one
/// message, which carries whatever the state is when the frame ends. Outside
/// a tokio runtime, or with a zero frame, every change is sent immediately.
#[derive(Clone)]
pub struct LocalAwareness {
    inner: Arc<LocalInner>,
}

impl LocalAwareness {
    pub fn new(channel: Arc<dyn AwarenessChannel>, initial: PeerPresence, frame_ms: u64) -> Self {
        Self {
            inner: Arc::new(LocalInner {
                channel,
                state: RwLock::new(initial),
                observers: RwLock::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                pending: AtomicBool::new(false),
                left: AtomicBool::new(false),
                frame: Duration::from_millis(frame_ms),
                broadcasts: AtomicU64::new(0),
            }),
        }
    }

    pub fn peer_id(&self) -> String {
        self.inner.state.read().peer_id.clone()
    }

    pub fn state(&self) -> PeerPresence {
        self.inner.state.read().clone()
    }

    /// Change the local presence, notify observers and schedule a broadcast.
    /// Changes that leave the state as it was do nothing.
    pub fn update(&self, f: impl FnOnce(&mut PeerPresence)) {
        let next = {
            let mut state = self.inner.state.write();
            let before = state.clone();
            f(&mut state);
            state.peer_id = before.peer_id.clone();
            if state.same_state(&before) {
                return;
            }
            state.last_activity = now_millis();
            state.clone()
        };

        let observers: Vec<PresenceObserver> = self
            .inner
            .observers
            .read()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(&next);
        }
        self.schedule();
    }

    /// Replace the whole presence, keeping this peer's id.
    pub fn replace(&self, presence: PeerPresence) {
        self.update(move |state| *state = presence);
    }

    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&PeerPresence) + Send + Sync + 'static,
    {
        let id = ObserverId(self.inner.next_observer.fetch_add(1, Ordering::Relaxed));
        self.inner.observers.write().push((id, Arc::new(observer)));
        id
    }

    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.inner.observers.write();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Send any pending broadcast now.
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Re-announce the current state so peers keep this one alive.
    pub fn heartbeat(&self) {
        if self.inner.left.load(Ordering::Acquire) {
            return;
        }
        self.inner.pending.store(true, Ordering::Release);
        self.inner.flush();
    }

    /// Tell peers this one is leaving. Nothing is broadcast afterwards.
    pub fn leave(&self) {
        if self.inner.left.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.pending.store(false, Ordering::Release);
        debug!(peer = %self.peer_id(), "Leaving");
        self.inner.channel.broadcast(AwarenessMessage::Leave {
            peer: self.peer_id(),
        });
    }

    pub fn has_left(&self) -> bool {
        self.inner.left.load(Ordering::Acquire)
    }

    /// State messages sent so far.
    pub fn broadcast_count(&self) -> u64 {
        self.inner.broadcasts.load(Ordering::Relaxed)
    }

    fn schedule(&self) {
        if self.inner.left.load(Ordering::Acquire) || self.inner.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let frame = self.inner.frame;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) if !frame.is_zero() => {
                let inner: Weak<LocalInner> = Arc::downgrade(&self.inner);
                runtime.spawn(async move {
                    tokio::time::sleep(frame).await;
                    if let Some(inner) = inner.upgrade() {
                        inner.flush();
                    }
                });
            }
            _ => self.inner.flush(),
        }
    }
}

struct DerivationInner {
    store: Store,
    local: LocalAwareness,
    preferences: RwLock<UserPreferences>,
    listener: Mutex<Option<ListenerId>>,
}

impl DerivationInner {
    fn recompute(&self) {
        let preferences = self.preferences.read().clone();
        let records = self.store.records_in(RecordScope::Session);
        self.local.replace(derive_presence(&preferences, &records));
    }
}

/// Keeps the local presence in step with the store's session records and
/// the user's preferences.
pub struct PresenceDerivation {
    inner: Arc<DerivationInner>,
}

impl PresenceDerivation {
    pub fn attach(store: Store, preferences: UserPreferences, local: LocalAwareness) -> Self {
        let inner = Arc::new(DerivationInner {
            store: store.clone(),
            local,
            preferences: RwLock::new(preferences),
            listener: Mutex::new(None),
        });
        let weak = Arc::downgrade(&inner);
        let listener = store.listen(ListenFilter::all().scope(RecordScope::Session), move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.recompute();
            }
        });
        *inner.listener.lock() = Some(listener);
        inner.recompute();
        Self { inner }
    }

    pub fn preferences(&self) -> UserPreferences {
        self.inner.preferences.read().clone()
    }

    pub fn set_preferences(&self, preferences: UserPreferences) {
        *self.inner.preferences.write() = preferences;
        self.inner.recompute();
    }

    /// Stop following the store.
    pub fn detach(&self) {
        if let Some(id) = self.inner.listener.lock().take() {
            self.inner.store.unlisten(id);
        }
    }
}

struct PeerEntry {
    presence: PeerPresence,
    last_seen: u64,
}

struct RemoteInner {
    local_peer: String,
    store: Store,
    channel: Arc<dyn AwarenessChannel>,
    peers: RwLock<BTreeMap<String, PeerEntry>>,
    timeout_ms: u64,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl RemoteInner {
    fn receive(&self, message: &AwarenessMessage, now: u64) {
        if message.peer() == self.local_peer {
            return;
        }
        match message {
            AwarenessMessage::State { peer, state } => {
                let mut presence = state.clone();
                presence.peer_id = peer.clone();
                let record = presence.to_record();
                self.peers.write().insert(
                    peer.clone(),
                    PeerEntry {
                        presence,
                        last_seen: now,
                    },
                );
                self.store.merge_remote_changes(|| self.store.put([record]));
            }
            AwarenessMessage::Leave { peer } => {
                debug!(peer = %peer, "Peer left");
                self.remove_peers(std::slice::from_ref(peer));
            }
        }
    }

    fn remove_peers(&self, peers: &[String]) {
        {
            let mut known = self.peers.write();
            for peer in peers {
                known.remove(peer);
            }
        }
        let ids: Vec<RecordId> = peers.iter().map(|peer| RecordId::presence(peer)).collect();
        self.store.merge_remote_changes(|| self.store.remove(ids.iter()));
    }
}

/// Other peers' presence, mirrored into the store.
#[derive(Clone)]
pub struct RemoteAwareness {
    inner: Arc<RemoteInner>,
}

impl RemoteAwareness {
    /// Subscribe to `channel` on behalf of `local_peer`.
    pub fn attach(
        channel: Arc<dyn AwarenessChannel>,
        store: Store,
        local_peer: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        let local_peer = local_peer.into();
        let inner = Arc::new(RemoteInner {
            local_peer: local_peer.clone(),
            store,
            channel: channel.clone(),
            peers: RwLock::new(BTreeMap::new()),
            timeout_ms,
            subscription: Mutex::new(None),
        });
        let weak = Arc::downgrade(&inner);
        let subscription = channel.subscribe(
            &local_peer,
            Arc::new(move |message: &AwarenessMessage| {
                if let Some(inner) = weak.upgrade() {
                    inner.receive(message, now_millis());
                }
            }),
        );
        *inner.subscription.lock() = Some(subscription);
        Self { inner }
    }

    /// Latest known presence of every remote peer, by peer id.
    pub fn peer_states(&self) -> BTreeMap<String, PeerPresence> {
        self.inner
            .peers
            .read()
            .iter()
            .map(|(peer, entry)| (peer.clone(), entry.presence.clone()))
            .collect()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.read().len()
    }

    pub fn last_seen(&self, peer: &str) -> Option<u64> {
        self.inner.peers.read().get(peer).map(|entry| entry.last_seen)
    }

    /// Apply a message as if it arrived at `now`.
    pub fn receive_at(&self, message: &AwarenessMessage, now: u64) {
        self.inner.receive(message, now);
    }

    /// Drop peers not heard from within the timeout. Returns their ids.
    pub fn prune_stale(&self, now: u64) -> Vec<String> {
        let stale: Vec<String> = self
            .inner
            .peers
            .read()
            .iter()
            .filter(|(_, entry)| now.saturating_sub(entry.last_seen) > self.inner.timeout_ms)
            .map(|(peer, _)| peer.clone())
            .collect();
        if !stale.is_empty() {
            debug!(peers = ?stale, "Pruning stale peers");
            self.inner.remove_peers(&stale);
        }
        stale
    }

    /// Unsubscribe and remove every remote peer's record from the store.
    pub fn detach(&self) {
        if let Some(id) = self.inner.subscription.lock().take() {
            self.inner.channel.unsubscribe(id);
        }
        let peers: Vec<String> = self.inner.peers.read().keys().cloned().collect();
        if !peers.is_empty() {
            self.inner.remove_peers(&peers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::awareness::AwarenessHub;
    use serde_json::json;

    fn presence(peer: &str) -> PeerPresence {
        PeerPresence::new(peer, peer.to_uppercase(), PresenceColors::color_for_peer(peer))
    }

    #[test]
    fn test_colors_are_stable() {
        let color = PresenceColors::color_for_peer("alice");
        assert!(PresenceColors::COLORS.contains(&color));
        assert_eq!(color, PresenceColors::color_for_peer("alice"));
        assert_eq!(UserPreferences::new("alice").resolved_color(), color);
        assert_eq!(
            UserPreferences::new("alice").with_color("#000000").resolved_color(),
            "#000000"
        );
    }

    #[test]
    fn test_presence_record() {
        let record = presence("alice").to_record();
        assert_eq!(record.id().as_str(), "instance_presence:alice");
        assert_eq!(record.scope(), RecordScope::Presence);
        assert_eq!(record.get("userName"), Some(&json!("ALICE")));
        assert_eq!(record.get("typeName"), Some(&json!(PRESENCE_TYPE)));
    }

    #[test]
    fn test_derive_presence_from_session_records() {
        let records = vec![
            Record::new("instance:instance").with("currentPageId", "page:two"),
            Record::new("instance_page_state:one")
                .with("pageId", "page:one")
                .with("selectedShapeIds", json!(["shape:x"])),
            Record::new("instance_page_state:two")
                .with("pageId", "page:two")
                .with("selectedShapeIds", json!(["shape:a", "shape:b"])),
            Record::new("camera:page:two").with("x", 5.0).with("y", -3.0).with("z", 2.0),
            Record::new("pointer:pointer").with("x", 40.0).with("y", 50.0),
        ];
        let prefs = UserPreferences::new("alice").with_name("Alice");
        let derived = derive_presence(&prefs, &records);

        assert_eq!(derived.user_name, "Alice");
        assert_eq!(derived.current_page_id, Some(RecordId::new("page:two")));
        assert_eq!(derived.selected_ids, vec![RecordId::new("shape:a"), RecordId::new("shape:b")]);
        assert_eq!(derived.camera, Camera { x: 5.0, y: -3.0, z: 2.0 });
        assert_eq!((derived.cursor.x, derived.cursor.y), (40.0, 50.0));

        let empty = derive_presence(&UserPreferences::new("bob"), &[]);
        assert_eq!(empty.user_name, UserPreferences::DEFAULT_NAME);
        assert_eq!(empty.camera, Camera::default());
    }

    #[test]
    fn test_local_update_without_runtime_broadcasts_immediately() {
        let hub = AwarenessHub::new();
        let local = LocalAwareness::new(Arc::new(hub.clone()), presence("alice"), 16);
        let seen = Arc::new(Mutex::new(0));
        let count = seen.clone();
        local.observe(move |_| *count.lock() += 1);

        local.update(|p| p.cursor.x = 10.0);
        local.update(|p| p.cursor.x = 10.0);
        local.update(|p| p.peer_id = "mallory".to_string());

        assert_eq!(*seen.lock(), 1);
        assert_eq!(local.broadcast_count(), 1);
        assert_eq!(local.peer_id(), "alice");
        assert!(local.state().last_activity > 0);
    }

    #[tokio::test]
    async fn test_local_broadcast_is_throttled_to_one_per_frame() {
        let hub = AwarenessHub::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        hub.subscribe(
            "bob",
            Arc::new(move |message: &AwarenessMessage| sink.lock().push(message.clone())),
        );
        let local = LocalAwareness::new(Arc::new(hub.clone()), presence("alice"), 20);

        for x in 1..=5 {
            local.update(|p| p.cursor.x = x as f64);
        }
        assert!(received.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;
        let received = received.lock();
        assert_eq!(received.len(), 1);
        match &received[0] {
            AwarenessMessage::State { state, .. } => assert_eq!(state.cursor.x, 5.0),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_leave_stops_broadcasts() {
        let hub = AwarenessHub::new();
        let local = LocalAwareness::new(Arc::new(hub.clone()), presence("alice"), 0);
        local.leave();
        local.leave();
        local.update(|p| p.cursor.x = 1.0);
        local.heartbeat();

        assert!(local.has_left());
        assert_eq!(local.broadcast_count(), 0);
        assert_eq!(hub.messages_sent(), 1);
    }

    #[test]
    fn test_derivation_follows_session_records() {
        let hub = AwarenessHub::new();
        let store = Store::new();
        let local = LocalAwareness::new(Arc::new(hub), PeerPresence::new("alice", "", ""), 0);
        let derivation = PresenceDerivation::attach(store.clone(), UserPreferences::new("alice"), local.clone());
        assert_eq!(local.state().user_name, UserPreferences::DEFAULT_NAME);

        store.put([Record::new("pointer:pointer").with("x", 7.0).with("y", 8.0)]);
        assert_eq!(local.state().cursor.x, 7.0);

        // Document records do not affect presence.
        let before = local.broadcast_count();
        store.put([Record::new("shape:a")]);
        assert_eq!(local.broadcast_count(), before);

        derivation.set_preferences(UserPreferences::new("alice").with_name("Alice"));
        assert_eq!(local.state().user_name, "Alice");

        derivation.detach();
        store.put([Record::new("pointer:pointer").with("x", 99.0)]);
        assert_eq!(local.state().cursor.x, 7.0);
    }

    #[test]
    fn test_remote_peers_become_records() {
        let hub = AwarenessHub::new();
        let store = Store::new();
        let remote = RemoteAwareness::attach(Arc::new(hub.clone()), store.clone(), "alice", 30_000);

        let bob = LocalAwareness::new(Arc::new(hub.clone()), presence("bob"), 0);
        bob.update(|p| p.cursor.x = 3.0);
        // Own messages are ignored.
        remote.receive_at(
            &AwarenessMessage::State {
                peer: "alice".to_string(),
                state: presence("alice"),
            },
            1,
        );

        assert_eq!(remote.peer_count(), 1);
        assert_eq!(remote.peer_states()["bob"].cursor.x, 3.0);
        let record = store.get(&RecordId::presence("bob")).unwrap();
        assert_eq!(record.get("cursor").unwrap()["x"], json!(3.0));

        bob.leave();
        assert_eq!(remote.peer_count(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_prune_stale_peers() {
        let hub = AwarenessHub::new();
        let store = Store::new();
        let remote = RemoteAwareness::attach(Arc::new(hub.clone()), store.clone(), "alice", 1_000);

        let state = |peer: &str| AwarenessMessage::State {
            peer: peer.to_string(),
            state: presence(peer),
        };
        remote.receive_at(&state("bob"), 10_000);
        remote.receive_at(&state("carol"), 10_500);

        assert!(remote.prune_stale(10_900).is_empty());
        assert_eq!(remote.prune_stale(11_200), vec!["bob".to_string()]);
        assert_eq!(remote.last_seen("carol"), Some(10_500));
        assert!(store.has(&RecordId::presence("carol")));
        assert!(!store.has(&RecordId::presence("bob")));

        remote.detach();
        assert!(store.is_empty());
        assert_eq!(hub.subscriber_count(), 0);
    }
}
