use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::{Record, RecordId, RecordScope};
use tessera_doc::{create_network, Connection, MemoryDocHandle};
use tessera_store::Store;
use tessera_sync::{AwarenessHub, Diagnostics, Session, SyncConfig, SyncError, UserPreferences};
use tracing::{debug, info};

/// Statistics collected during a simulation run
#[derive(Clone, Debug, Default)]
pub struct SimulationStats {
    pub num_peers: usize,
    pub edits_per_peer: usize,
    pub total_edits: usize,
    pub offline_periods: usize,
    pub total_time: Duration,
    pub shapes: usize,
    pub presence_records: usize,
    pub diagnostics: Diagnostics,
    pub converged: bool,
}

impl SimulationStats {
    pub fn print(&self) {
        let d = &self.diagnostics;
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Simulation Statistics                          ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Peers:                     {:>30} ║", self.num_peers);
        println!("║  Edits per Peer:            {:>30} ║", self.edits_per_peer);
        println!("║  Total Edits:               {:>30} ║", self.total_edits);
        println!("║  Offline Periods:           {:>30} ║", self.offline_periods);
        println!("║  Shapes:                    {:>30} ║", self.shapes);
        println!("║  Presence Records:          {:>30} ║", self.presence_records);
        println!("║  Outgoing Transactions:     {:>30} ║", d.outgoing_transactions);
        println!("║  Remote Batches Applied:    {:>30} ║", d.applied_batches);
        println!("║  Echoes Skipped:            {:>30} ║", d.skipped_echoes);
        println!("║  Rejected Patches:          {:>30} ║", d.rejected_patches);
        println!("║  Reconciled Records:        {:>30} ║", d.reconciled_records);
        println!("║  Invariant Violations:      {:>30} ║", d.invariant_violations);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Converged:                 {:>30} ║", if self.converged { "yes" } else { "NO" });
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// One step of the simulated workload
#[derive(Clone, Debug)]
enum Step {
    /// Create a shape owned by the peer.
    Create { peer: usize },
    /// Move one of the peer's own shapes.
    Move { peer: usize, dx: i64, dy: i64 },
    /// Tag any shape the peer can see under its own key in `meta`.
    Annotate { peer: usize, value: u32 },
    /// Move the peer's pointer.
    Point { peer: usize, x: f64, y: f64 },
    /// Take the peer offline, or bring it back.
    ToggleConnection { peer: usize },
}

/// Generator for a random but reproducible workload
fn workload(num_peers: usize, edits_per_peer: usize, seed: u64) -> impl Stream<Item = Step> {
    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        for peer in 0..num_peers {
            yield Step::Create { peer };
        }
        for _ in 0..num_peers * edits_per_peer {
            let peer = rng.gen_range(0..num_peers);
            yield match rng.gen_range(0..100) {
                0..=4 => Step::ToggleConnection { peer },
                5..=14 => Step::Create { peer },
                15..=49 => Step::Move { peer, dx: rng.gen_range(-20..=20), dy: rng.gen_range(-20..=20) },
                50..=79 => Step::Annotate { peer, value: rng.gen() },
                _ => Step::Point { peer, x: rng.gen_range(0.0..1000.0), y: rng.gen_range(0.0..1000.0) },
            };
        }
    }
}

fn peer_name(peer: usize) -> String {
    format!("peer-{}", peer)
}

fn owned_by(record: &Record, peer: usize) -> bool {
    record.get("owner").and_then(Value::as_str) == Some(peer_name(peer).as_str())
}

fn shapes(store: &Store) -> Vec<Record> {
    store
        .records_in(RecordScope::Document)
        .into_iter()
        .filter(|record| record.type_name() == "shape")
        .collect()
}

fn apply_step(step: &Step, sessions: &[Session], docs: &[MemoryDocHandle], rng: &mut StdRng) -> bool {
    match *step {
        Step::Create { peer } => {
            let shape = Record::new(RecordId::generate("shape"))
                .with("owner", peer_name(peer))
                .with("x", rng.gen_range(0..800i64))
                .with("y", rng.gen_range(0..600i64))
                .with("props", json!({"w": 100, "h": 60, "geo": "rectangle"}))
                .with("meta", json!({}));
            sessions[peer].store().put([shape]);
        }
        Step::Move { peer, dx, dy } => {
            let store = sessions[peer].store();
            let mine: Vec<Record> = shapes(store).into_iter().filter(|r| owned_by(r, peer)).collect();
            if mine.is_empty() {
                return false;
            }
            let shape = &mine[rng.gen_range(0..mine.len())];
            let x = shape.get("x").and_then(Value::as_i64).unwrap_or(0) + dx;
            let y = shape.get("y").and_then(Value::as_i64).unwrap_or(0) + dy;
            store.put([shape.clone().with("x", x).with("y", y)]);
        }
        Step::Annotate { peer, value } => {
            let store = sessions[peer].store();
            let visible = shapes(store);
            if visible.is_empty() {
                return false;
            }
            let shape = &visible[rng.gen_range(0..visible.len())];
            let mut meta = shape.get("meta").cloned().unwrap_or_else(|| json!({}));
            if let Value::Object(fields) = &mut meta {
                fields.insert(peer_name(peer), json!(value));
            }
            store.put([shape.clone().with("meta", meta)]);
        }
        Step::Point { peer, x, y } => {
            sessions[peer]
                .store()
                .put([Record::new("pointer:pointer").with("x", x).with("y", y)]);
        }
        Step::ToggleConnection { peer } => {
            let doc = &docs[peer];
            if doc.connection() == Connection::Offline {
                debug!(peer, "Back online");
                doc.go_online();
            } else {
                debug!(peer, "Going offline");
                doc.go_offline();
                return true;
            }
        }
    }
    false
}

fn sum(total: &mut Diagnostics, next: Diagnostics) {
    total.applied_batches += next.applied_batches;
    total.upserts += next.upserts;
    total.removals += next.removals;
    total.rejected_patches += next.rejected_patches;
    total.reconciled_records += next.reconciled_records;
    total.skipped_patches += next.skipped_patches;
    total.invariant_violations += next.invariant_violations;
    total.skipped_echoes += next.skipped_echoes;
    total.outgoing_transactions += next.outgoing_transactions;
    total.failed_transactions += next.failed_transactions;
}

/// Every document replica agrees, and every store holds exactly its
/// replica's records.
fn converged(sessions: &[Session], docs: &[MemoryDocHandle]) -> bool {
    let reference = docs[0].snapshot();
    docs.iter().all(|doc| doc.snapshot() == reference)
        && sessions.iter().all(|session| {
            let records = session.store().records_in(RecordScope::Document);
            records.len() == reference.len()
                && records
                    .iter()
                    .all(|record| reference.get(record.id()) == Some(&record.to_value()))
        })
}

/// Run peers editing shared shapes over an in-memory network with random
/// offline periods, then bring everyone back online and check convergence.
///
/// Peers only move shapes they own and only annotate under their own key,
/// so concurrent edits always touch distinct paths. Presence broadcasts
/// are unthrottled so every peer's presence is settled when the run ends.
pub async fn run_simulation(
    num_peers: usize,
    edits_per_peer: usize,
    seed: u64,
) -> Result<SimulationStats, SyncError> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Shape Editing Simulation                            ║");
    println!("║  Peers: {} | Edits/Peer: {} | Seed: {}", num_peers, edits_per_peer, seed);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let hub = AwarenessHub::new();
    let docs = create_network(num_peers);
    let config = SyncConfig::builder()
        .presence_frame_interval(0)
        .presence_prune_interval(0)
        .build();

    let mut sessions = Vec::with_capacity(num_peers);
    for (peer, doc) in docs.iter().enumerate() {
        let session = Session::open(
            Store::new(),
            Arc::new(doc.clone()),
            Arc::new(hub.clone()),
            UserPreferences::new(peer_name(peer)).with_name(format!("User {}", peer)),
            config.clone(),
        );
        session.load().await?;
        sessions.push(session);
    }
    for session in &sessions {
        session.local_presence().heartbeat();
    }

    println!("\n[Phase 1/2] Editing...");
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let mut steps = Box::pin(workload(num_peers, edits_per_peer, seed));
    let mut stats = SimulationStats {
        num_peers,
        edits_per_peer,
        ..Default::default()
    };
    while let Some(step) = steps.next().await {
        if apply_step(&step, &sessions, &docs, &mut rng) {
            stats.offline_periods += 1;
        }
        stats.total_edits += 1;
        if stats.total_edits % 500 == 0 {
            println!("  Steps completed: {}", stats.total_edits);
            tokio::task::yield_now().await;
        }
    }

    println!("[Phase 2/2] Reconnecting and checking convergence...");
    for doc in &docs {
        doc.go_online();
    }

    for session in &sessions {
        sum(&mut stats.diagnostics, session.diagnostics());
    }
    stats.shapes = shapes(sessions[0].store()).len();
    stats.presence_records = sessions
        .iter()
        .map(|session| session.store().records_in(RecordScope::Presence).len())
        .sum();
    stats.converged = converged(&sessions, &docs);
    stats.total_time = start.elapsed();

    info!(
        peers = num_peers,
        shapes = stats.shapes,
        converged = stats.converged,
        "Simulation finished"
    );
    for session in &sessions {
        session.close();
    }
    Ok(stats)
}
