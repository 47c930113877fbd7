//! Tessera Sync - keeps a record store and a replicated document in step
//!
//! The bridge listens in both directions. Remote document changes arrive
//! as ordered structural patches and are translated into record upserts
//! and removals; local store changes are merged into the document field by
//! field, one transaction per change batch. A guard keeps the bridge from
//! re-applying its own writes. Peer presence travels over a separate
//! awareness channel and is merged into the store, never the document.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_core::Record;
//! use tessera_doc::create_network;
//! use tessera_store::Store;
//! use tessera_sync::{AwarenessHub, Session, SyncConfig, UserPreferences};
//!
//! # tokio_test::block_on(async {
//! let hub = AwarenessHub::new();
//! let docs = create_network(2);
//! let alice = Session::open(
//!     Store::new(),
//!     Arc::new(docs[0].clone()),
//!     Arc::new(hub.clone()),
//!     UserPreferences::new("alice"),
//!     SyncConfig::default(),
//! );
//! let bob = Session::open(
//!     Store::new(),
//!     Arc::new(docs[1].clone()),
//!     Arc::new(hub.clone()),
//!     UserPreferences::new("bob"),
//!     SyncConfig::default(),
//! );
//! alice.load().await.unwrap();
//! bob.load().await.unwrap();
//!
//! alice.store().put([Record::new("shape:a").with("x", 10)]);
//! assert!(bob.store().get(&"shape:a".into()).is_some());
//! # });
//! ```
//!
//! # Architecture
//!
//! - [`translate`] - document patches to record changes
//! - [`mutator`] - store changes to one document transaction
//! - [`guard`] - echo suppression
//! - [`presence`] - local and remote peer presence
//! - [`awareness`] - the presence side channel
//! - [`bridge`] - wiring between one store and one document
//! - [`session`] - a bridge plus presence, closed together
//! - [`config`] - configuration
//! - [`error`] - error types

pub mod awareness;
pub mod bridge;
pub mod config;
pub mod error;
pub mod guard;
pub mod mutator;
pub mod presence;
pub mod session;
pub mod translate;

pub use awareness::{AwarenessChannel, AwarenessHandler, AwarenessHub, AwarenessMessage, SubscriptionId};
pub use bridge::{BridgeStatus, Diagnostics, StoreBridge};
pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{Result, SyncError, TranslateError};
pub use guard::{FeedbackGuard, GuardToken};
pub use mutator::{merge_record, OutgoingMutator};
pub use presence::{
    derive_presence, now_millis, Camera, Cursor, LocalAwareness, ObserverId, PeerPresence, PresenceColors,
    PresenceDerivation, PresenceObserver, RemoteAwareness, UserPreferences,
};
pub use session::Session;
pub use translate::{PatchTranslator, Rejection, Translation};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::awareness::{AwarenessChannel, AwarenessHub};
    pub use crate::bridge::{BridgeStatus, StoreBridge};
    pub use crate::config::SyncConfig;
    pub use crate::error::SyncError;
    pub use crate::presence::{PeerPresence, UserPreferences};
    pub use crate::session::Session;
    pub use tessera_core::{Patch, Path, Record, RecordId};
    pub use tessera_doc::{DocHandle, MemoryDocHandle};
    pub use tessera_store::Store;
}
