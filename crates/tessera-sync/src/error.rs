//! Error types for the sync bridge.

use tessera_core::{PatchError, RecordError, RecordId};
use tessera_doc::DocError;
use thiserror::Error;

/// A patch batch that cannot be translated. Nothing from the batch is
/// applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Patch {index} ({action} at {path}) violates a translation invariant: {source}")]
    InvariantViolation {
        index: usize,
        action: String,
        path: String,
        #[source]
        source: PatchError,
    },

    #[error("Translated record {id} is invalid: {source}")]
    InvalidRecord {
        id: RecordId,
        #[source]
        source: RecordError,
    },
}

/// Errors surfaced by the bridge and session.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Doc(#[from] DocError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error("Invalid record in document: {0}")]
    Record(#[from] RecordError),

    #[error("Document is unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, SyncError>;
