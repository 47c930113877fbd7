//! # Tessera Inspect
//!
//! A standalone CLI around the store ⇄ document bridge.
//!
//! - `translate` runs a JSON patch batch against a JSON store snapshot and
//!   shows the record upserts, removals and rejected patches it produces.
//! - `patches` shows the patches a document emits when a record is written
//!   into it.
//! - `demo` replays two peers editing a shape, going offline, merging, and
//!   seeing each other's cursors.
//!
//! ## Input formats
//!
//! ```text
//! store:   [{"id": "shape:a", "x": 1, ...}, ...]   or   {"shape:a": {...}, ...}
//! patches: [{"action": "put", "path": ["shape:a", "x"], "value": 2}, ...]
//! ```

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde_json::{json, Value};
use tessera_core::{ApplyOptions, NestedDelete, Patch, Path, Record, RecordId};
use tessera_doc::{create_network, ChangeEvent, DocHandle, MemoryDocHandle};
use tessera_store::{RecordsDiff, Store};
use tessera_sync::{
    AwarenessHub, OutgoingMutator, PatchTranslator, Session, SyncConfig, Translation, UserPreferences,
};

type CliResult = Result<(), Box<dyn Error>>;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "tessera-inspect")]
#[command(about = "Inspect record store ⇄ document patch translation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a patch batch against a store snapshot
    Translate {
        /// JSON file with the current records
        #[arg(long)]
        store: PathBuf,
        /// JSON file with the patch batch
        #[arg(long)]
        patches: PathBuf,
        /// How `del` patches below a record root are handled
        #[arg(long, value_enum, default_value_t = NestedDeleteArg::Reject)]
        nested_delete: NestedDeleteArg,
        /// Print the result as JSON instead of a report
        #[arg(long)]
        json: bool,
    },
    /// Show the patches produced by writing a record into an empty document
    Patches {
        /// JSON file with one record
        record: PathBuf,
    },
    /// Two peers edit, go offline, merge and share presence
    Demo,
}

#[derive(Clone, Copy, ValueEnum)]
enum NestedDeleteArg {
    Reject,
    Remove,
}

impl From<NestedDeleteArg> for NestedDelete {
    fn from(arg: NestedDeleteArg) -> Self {
        match arg {
            NestedDeleteArg::Reject => NestedDelete::Reject,
            NestedDeleteArg::Remove => NestedDelete::Remove,
        }
    }
}

// ─── Input ─────────────────────────────────────────────────────────────────

fn read_json(path: &PathBuf) -> Result<Value, Box<dyn Error>> {
    let text = fs::read_to_string(path).map_err(|err| format!("{}: {}", path.display(), err))?;
    Ok(serde_json::from_str(&text).map_err(|err| format!("{}: {}", path.display(), err))?)
}

/// Accepts a list of records or an id → record map.
fn read_records(path: &PathBuf) -> Result<BTreeMap<RecordId, Record>, Box<dyn Error>> {
    let records = match read_json(path)? {
        Value::Array(items) => items
            .into_iter()
            .map(Record::from_value)
            .collect::<Result<Vec<_>, _>>()?,
        Value::Object(map) => map
            .into_iter()
            .map(|(id, value)| Record::with_id(RecordId::new(id), value))
            .collect::<Result<Vec<_>, _>>()?,
        other => return Err(format!("{}: expected an array or object, found {}", path.display(), other).into()),
    };
    Ok(records
        .into_iter()
        .map(|record| (record.id().clone(), record))
        .collect())
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn show_patch(patch: &Patch) {
    let action = match patch {
        Patch::Put { .. } => patch.action().bright_green(),
        Patch::Insert { .. } => patch.action().bright_cyan(),
        Patch::Update { .. } => patch.action().bright_blue(),
        Patch::Splice { .. } => patch.action().bright_magenta(),
        Patch::Del { .. } => patch.action().bright_red(),
        Patch::Unrecognized { .. } => patch.action().dimmed(),
    };
    let payload = match patch {
        Patch::Put { value, .. } | Patch::Update { value, .. } | Patch::Splice { value, .. } => value.to_string(),
        Patch::Insert { values, .. } => Value::Array(values.clone()).to_string(),
        Patch::Del { length, .. } if *length != 1 => format!("×{}", length),
        _ => String::new(),
    };
    println!("    {:<8} {} {}", action, patch.path().to_string().bright_white(), payload.dimmed());
}

fn show_record(record: &Record) {
    let border = "─".repeat(56);
    println!("  ┌{}┐", border);
    println!("  │ {:<54} │", record.id().to_string().bright_yellow().to_string());
    println!("  ├{}┤", border);
    for (key, value) in record.fields() {
        if key == "id" {
            continue;
        }
        let line = format!("{:<14} {}", key, value);
        println!("  │ {:<54} │", line);
    }
    println!("  └{}┘", border);
}

fn show_translation(translation: &Translation) {
    section(&format!("Upserts ({})", translation.upserts.len()));
    for record in &translation.upserts {
        show_record(record);
    }
    section(&format!("Removals ({})", translation.removals.len()));
    for id in &translation.removals {
        println!("    {} {}", "✗".bright_red(), id);
    }
    if !translation.rejected.is_empty() {
        section(&format!("Rejected ({})", translation.rejected.len()));
        for rejection in &translation.rejected {
            println!("    {} #{} {}", "!".bright_yellow(), rejection.index, rejection.error.to_string().yellow());
        }
    }
    if !translation.skipped.is_empty() {
        section(&format!("Skipped ({})", translation.skipped.len()));
        for skipped in &translation.skipped {
            println!("    {} #{} {}", "?".dimmed(), skipped.index, skipped.patch.action().dimmed());
        }
    }
}

fn verdict(ok: bool, yes: &str, no: &str) {
    if ok {
        println!("\n  {} {}", "✓".bright_green().bold(), yes.bright_green().bold());
    } else {
        println!("\n  {} {}", "✗".bright_red().bold(), no.bright_red().bold());
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────

fn run_translate(store: &PathBuf, patches: &PathBuf, nested_delete: NestedDeleteArg, as_json: bool) -> CliResult {
    let records = read_records(store)?;
    let batch: Vec<Patch> = serde_json::from_value(read_json(patches)?)?;
    let translator = PatchTranslator::new(ApplyOptions {
        nested_delete: nested_delete.into(),
    });
    let translation = translator.translate(&batch, &records)?;

    if as_json {
        let report = json!({
            "upserts": translation.upserts.iter().map(Record::to_value).collect::<Vec<_>>(),
            "removals": translation.removals,
            "rejected": translation.rejected.iter().map(|r| json!({
                "index": r.index,
                "patch": r.patch,
                "error": r.error.to_string(),
            })).collect::<Vec<_>>(),
            "skipped": translation.skipped.iter().map(|r| r.index).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    header("TRANSLATE: Patch Batch → Record Changes");
    section(&format!("Patches ({})", batch.len()));
    for patch in &batch {
        show_patch(patch);
    }
    show_translation(&translation);
    Ok(())
}

fn run_patches(path: &PathBuf) -> CliResult {
    let record = Record::from_value(read_json(path)?)?;
    let handle = MemoryDocHandle::new("inspect");
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    handle.on_change(Arc::new(move |event: &ChangeEvent| {
        if let Ok(mut events) = sink.lock() {
            events.extend(event.patches.iter().cloned());
        }
    }));

    let mut diff = RecordsDiff::new();
    diff.record_put(None, record.clone());
    OutgoingMutator::apply(&diff, &handle, None)?;

    header("PATCHES: Writing a Record into a Document");
    show_record(&record);
    section("Emitted patches");
    let patches = seen.lock().map(|p| p.clone()).unwrap_or_default();
    for patch in &patches {
        show_patch(patch);
    }
    Ok(())
}

async fn run_demo() -> CliResult {
    header("DEMO: Store ⇄ Document Bridge");
    let config = SyncConfig::builder().presence_frame_interval(0).build();
    let hub = AwarenessHub::new();
    let docs = create_network(2);
    let open = |name: &str, doc: &MemoryDocHandle| {
        Session::open(
            Store::new(),
            Arc::new(doc.clone()),
            Arc::new(hub.clone()),
            UserPreferences::new(name).with_name(name.to_uppercase()),
            config.clone(),
        )
    };
    let alice = open("alice", &docs[0]);
    let bob = open("bob", &docs[1]);
    alice.load().await?;
    bob.load().await?;
    alice.local_presence().heartbeat();

    section("Phase 1: alice draws a shape");
    let shape = Record::new("shape:box")
        .with("x", 100)
        .with("y", 50)
        .with("props", json!({"w": 200, "h": 120, "text": "hello", "points": ["a", "b", "c"]}));
    alice.store().put([shape.clone()]);
    step("alice: put shape:box");
    if let Some(record) = bob.store().get(shape.id()) {
        show_record(&record);
    }

    section("Phase 2: both go offline and edit different fields");
    docs[0].go_offline();
    docs[1].go_offline();
    alice.store().put([shape.clone().with("x", 140)]);
    step("alice: x = 140");
    bob.store().put([shape.clone().with("props", json!({"w": 200, "h": 80, "text": "hello", "points": ["a", "b", "c"]}))]);
    step("bob:   props.h = 80");

    section("Phase 3: back online");
    docs[0].go_online();
    docs[1].go_online();
    let a = alice.store().get(shape.id());
    let b = bob.store().get(shape.id());
    if let Some(record) = &a {
        show_record(record);
    }
    verdict(
        a.is_some() && a == b,
        "BOTH STORES CONVERGED: field-level merge kept both edits",
        "DIVERGENCE DETECTED: stores differ!",
    );

    section("Phase 4: a remote insert at the front of an array");
    docs[1].change(None, &mut |tx| {
        tx.insert(&Path::parse("shape:box.props.points"), 0, vec![json!("n1"), json!("n2")])
    })?;
    if let Some(points) = alice.store().get(shape.id()).and_then(|r| r.get("props").cloned()) {
        step(&format!("alice sees points = {}", points["points"]));
    }

    section("Phase 5: presence");
    bob.store().put([Record::new("pointer:pointer").with("x", 320.0).with("y", 180.0)]);
    for (peer, presence) in alice.peers() {
        step(&format!(
            "alice sees {} ({}) at ({}, {}) in {}",
            presence.user_name.bright_magenta(),
            peer,
            presence.cursor.x,
            presence.cursor.y,
            presence.color
        ));
    }
    bob.close();
    step(&format!("bob leaves; alice sees {} peer(s)", alice.peers().len()));

    section("Diagnostics");
    for (name, session) in [("alice", &alice), ("bob", &bob)] {
        let d = session.diagnostics();
        step(&format!(
            "{}: {} outgoing, {} applied, {} echoes skipped, {} rejected",
            name.bright_yellow(),
            d.outgoing_transactions,
            d.applied_batches,
            d.skipped_echoes,
            d.rejected_patches
        ));
    }
    alice.close();
    Ok(())
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Translate {
            store,
            patches,
            nested_delete,
            json,
        } => run_translate(&store, &patches, nested_delete, json),
        Commands::Patches { record } => run_patches(&record),
        Commands::Demo => run_demo().await,
    };

    if let Err(err) = result {
        eprintln!("{} {}", "error:".bright_red().bold(), err);
        std::process::exit(1);
    }
}
