//! Wires a store to a document handle in both directions.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError, TranslateError};
use crate::guard::FeedbackGuard;
use crate::mutator::OutgoingMutator;
use crate::translate::{PatchTranslator, Translation};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::{Patch, Record, RecordId, RecordScope};
use tessera_doc::{ChangeEvent, Connection, DocError, DocHandle, HandlerId, Origin};
use tessera_store::{ChangeSource, ListenFilter, ListenerId, RecordsDiff, Store, StoreChange};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Where the bridge is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeStatus {
    /// Waiting for the document.
    Loading,
    /// Loaded and following the document.
    SyncedRemote { connection: Connection },
}

/// Running totals kept by a bridge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Remote patch batches applied to the store.
    pub applied_batches: u64,
    pub upserts: u64,
    pub removals: u64,
    pub rejected_patches: u64,
    /// Records re-read from the document after one of their patches was rejected.
    pub reconciled_records: u64,
    pub skipped_patches: u64,
    /// Remote batches dropped whole.
    pub invariant_violations: u64,
    /// Document changes recognized as the bridge's own writes.
    pub skipped_echoes: u64,
    pub outgoing_transactions: u64,
    pub failed_transactions: u64,
}

#[derive(Default)]
struct Counters {
    applied_batches: AtomicU64,
    upserts: AtomicU64,
    removals: AtomicU64,
    rejected_patches: AtomicU64,
    reconciled_records: AtomicU64,
    skipped_patches: AtomicU64,
    invariant_violations: AtomicU64,
    skipped_echoes: AtomicU64,
    outgoing_transactions: AtomicU64,
    failed_transactions: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Diagnostics {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        Diagnostics {
            applied_batches: read(&self.applied_batches),
            upserts: read(&self.upserts),
            removals: read(&self.removals),
            rejected_patches: read(&self.rejected_patches),
            reconciled_records: read(&self.reconciled_records),
            skipped_patches: read(&self.skipped_patches),
            invariant_violations: read(&self.invariant_violations),
            skipped_echoes: read(&self.skipped_echoes),
            outgoing_transactions: read(&self.outgoing_transactions),
            failed_transactions: read(&self.failed_transactions),
        }
    }
}

/// Keeps a [`Store`] and a [`DocHandle`] in step.
///
/// User changes to document-scope records become one document transaction
/// per batch. Document changes made by anyone else are translated into
/// record upserts and removals and merged into the store as remote changes.
/// Nothing flows in either direction until [`StoreBridge::load`] finishes.
pub struct StoreBridge {
    store: Store,
    handle: Arc<dyn DocHandle>,
    config: SyncConfig,
    translator: PatchTranslator,
    guard: FeedbackGuard,
    counters: Counters,
    loaded: watch::Sender<bool>,
    store_listener: Mutex<Option<ListenerId>>,
    doc_handler: Mutex<Option<HandlerId>>,
}

impl StoreBridge {
    /// Register the bridge's listeners on `store` and `handle`.
    pub fn attach(store: Store, handle: Arc<dyn DocHandle>, config: SyncConfig) -> Arc<Self> {
        let (loaded, _) = watch::channel(false);
        let bridge = Arc::new(Self {
            store: store.clone(),
            handle: handle.clone(),
            translator: PatchTranslator::new(config.apply_options()),
            config,
            guard: FeedbackGuard::new(Origin::new()),
            counters: Counters::default(),
            loaded,
            store_listener: Mutex::new(None),
            doc_handler: Mutex::new(None),
        });

        let weak = Arc::downgrade(&bridge);
        let listener = store.listen(
            ListenFilter::all()
                .source(ChangeSource::User)
                .scope(RecordScope::Document),
            move |change| {
                if let Some(bridge) = weak.upgrade() {
                    bridge.on_store_change(change);
                }
            },
        );
        *bridge.store_listener.lock() = Some(listener);

        let weak = Arc::downgrade(&bridge);
        let handler = handle.on_change(Arc::new(move |event: &ChangeEvent| {
            if let Some(bridge) = weak.upgrade() {
                bridge.on_doc_change(event);
            }
        }));
        *bridge.doc_handler.lock() = Some(handler);

        debug!(origin = %bridge.guard.origin(), "Bridge attached");
        bridge
    }

    /// Wait for the document and reconcile it with the store.
    ///
    /// An empty document is seeded from the store's document records when
    /// the configuration allows it. Otherwise the document's records replace
    /// the store's.
    pub async fn load(&self) -> Result<()> {
        self.handle.when_ready().await.map_err(|err| match err {
            DocError::Unavailable => SyncError::Unavailable,
            other => SyncError::Doc(other),
        })?;
        let snapshot = self.handle.doc_sync().ok_or(SyncError::Unavailable)?;

        if snapshot.is_empty() && self.config.seed_empty_document {
            let mut seed = RecordsDiff::new();
            for record in self.store.records_in(RecordScope::Document) {
                seed.record_put(None, record);
            }
            let _token = self.guard.enter();
            if let Some(receipt) = OutgoingMutator::apply(&seed, self.handle.as_ref(), Some(self.guard.origin()))? {
                Counters::add(&self.counters.outgoing_transactions, 1);
                debug!(patches = receipt.patch_count, "Seeded empty document from store");
            }
        } else {
            let records = snapshot
                .into_iter()
                .map(|(id, value)| Record::with_id(id, value))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let count = records.len();
            self.store
                .merge_remote_changes(|| self.store.load_snapshot(records));
            debug!(records = count, "Loaded document into store");
        }

        self.loaded.send_replace(true);
        info!(origin = %self.guard.origin(), records = self.store.len(), "Bridge loaded");
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        *self.loaded.borrow()
    }

    /// Resolves once the bridge has loaded.
    pub fn loaded(&self) -> watch::Receiver<bool> {
        self.loaded.subscribe()
    }

    pub fn status(&self) -> BridgeStatus {
        if self.is_loaded() {
            BridgeStatus::SyncedRemote {
                connection: self.handle.status().connection,
            }
        } else {
            BridgeStatus::Loading
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.counters.snapshot()
    }

    pub fn origin(&self) -> Origin {
        self.guard.origin()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn handle(&self) -> &Arc<dyn DocHandle> {
        &self.handle
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Translate a remote patch batch and merge it into the store.
    ///
    /// An invariant violation drops the whole batch and leaves the store
    /// untouched.
    pub fn apply_remote(&self, patches: &[Patch]) -> std::result::Result<Translation, TranslateError> {
        self.merge_patches(patches, false)
    }

    fn merge_patches(&self, patches: &[Patch], reconcile: bool) -> std::result::Result<Translation, TranslateError> {
        let mut translation = match self.translator.translate(patches, &self.store) {
            Ok(translation) => translation,
            Err(err) => {
                Counters::add(&self.counters.invariant_violations, 1);
                return Err(err);
            }
        };
        if reconcile && !translation.rejected.is_empty() {
            self.reconcile_rejected(&mut translation);
        }
        translation.apply_to(&self.store);

        Counters::add(&self.counters.applied_batches, 1);
        Counters::add(&self.counters.upserts, translation.upserts.len());
        Counters::add(&self.counters.removals, translation.removals.len());
        Counters::add(&self.counters.rejected_patches, translation.rejected.len());
        Counters::add(&self.counters.skipped_patches, translation.skipped.len());
        Ok(translation)
    }

    /// The document already holds the effect of patches the translator
    /// rejected. Take those records from it so the store does not drift.
    fn reconcile_rejected(&self, translation: &mut Translation) {
        let Some(doc) = self.handle.doc_sync() else {
            warn!(rejected = translation.rejected.len(), "Document unavailable; rejected patches not reconciled");
            return;
        };
        let ids: BTreeSet<RecordId> = translation
            .rejected
            .iter()
            .filter_map(|rejection| rejection.patch.record_id().ok())
            .collect();
        for id in ids {
            translation.upserts.retain(|record| record.id() != &id);
            translation.removals.retain(|removed| removed != &id);
            match doc.get(&id) {
                Some(value) => match Record::with_id(id.clone(), value.clone()) {
                    Ok(record) => translation.upserts.push(record),
                    Err(err) => {
                        warn!(record = %id, error = %err, "Document record is malformed; not reconciled");
                        continue;
                    }
                },
                None => translation.removals.push(id.clone()),
            }
            Counters::add(&self.counters.reconciled_records, 1);
            debug!(record = %id, "Reconciled record from document");
        }
    }

    /// Remove the bridge's listeners. Safe to call more than once.
    pub fn detach(&self) {
        if let Some(id) = self.store_listener.lock().take() {
            self.store.unlisten(id);
        }
        if let Some(id) = self.doc_handler.lock().take() {
            self.handle.off_change(id);
        }
    }

    fn on_store_change(&self, change: &StoreChange) {
        if !self.is_loaded() {
            trace!(records = change.changes.len(), "Ignoring store change before load");
            return;
        }
        let _token = self.guard.enter();
        match OutgoingMutator::apply(&change.changes, self.handle.as_ref(), Some(self.guard.origin())) {
            Ok(Some(receipt)) => {
                Counters::add(&self.counters.outgoing_transactions, 1);
                trace!(patches = receipt.patch_count, "Forwarded store change");
            }
            Ok(None) => {}
            Err(err) => {
                Counters::add(&self.counters.failed_transactions, 1);
                warn!(error = %err, records = change.changes.len(), "Failed to write store change to document");
            }
        }
    }

    fn on_doc_change(&self, event: &ChangeEvent) {
        if self.guard.is_echo(event) {
            Counters::add(&self.counters.skipped_echoes, 1);
            trace!(seq = event.seq, "Skipping own document change");
            return;
        }
        if !self.is_loaded() {
            trace!(seq = event.seq, "Ignoring document change before load");
            return;
        }
        if let Err(err) = self.merge_patches(&event.patches, true) {
            error!(seq = event.seq, error = %err, "Dropped remote patch batch");
        }
    }
}

impl Drop for StoreBridge {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for StoreBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBridge")
            .field("origin", &self.guard.origin())
            .field("status", &self.status())
            .field("diagnostics", &self.diagnostics())
            .finish()
    }
}
