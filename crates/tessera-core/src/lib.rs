//! # Tessera Core
//!
//! The shared vocabulary of the sync bridge: records and their ids, document
//! paths, the structural patches a replicated document emits, and the rules
//! for applying one patch to the tree of the record it addresses.
//!
//! Nothing in this crate knows about stores or documents; both sides of the
//! bridge build on it.

pub mod apply;
pub mod error;
pub mod patch;
pub mod path;
pub mod record;

pub use apply::{apply_patch, Applied, ApplyOptions, NestedDelete};
pub use error::{PatchError, RecordError, Result, WireError};
pub use patch::{Patch, WirePatch};
pub use path::{resolve, resolve_mut, Path, PathKey};
pub use record::{value_kind, Record, RecordId, RecordScope, PRESENCE_TYPE};
