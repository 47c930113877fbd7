//! Error types for records and structural patches.

use crate::record::RecordId;
use thiserror::Error;

/// Errors raised while applying a structural patch to a record tree.
///
/// The variants fall into two classes. Resolution failures mean the patch
/// stream and the working copy have diverged; they are fatal for the whole
/// batch. `Unsupported` and `Unrecognized` only invalidate the offending
/// patch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Missing ancestor at {path}")]
    MissingAncestor { path: String },

    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Index {index} out of range at {path} (length: {length})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        length: usize,
    },

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Unrecognized patch action: {0}")]
    Unrecognized(String),
}

impl PatchError {
    /// Whether this error invalidates the whole patch batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PatchError::InvalidPath { .. }
                | PatchError::MissingAncestor { .. }
                | PatchError::TypeMismatch { .. }
                | PatchError::IndexOutOfRange { .. }
        )
    }
}

/// Errors raised when a JSON value cannot be used as a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("Record is missing a string `id` field")]
    MissingId,

    #[error("Record id mismatch: expected {expected}, found {found}")]
    IdMismatch { expected: RecordId, found: String },
}

/// Errors raised when converting a patch from its wire form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("`{action}` patch at {path} is missing its `{field}` payload")]
    MissingPayload {
        action: &'static str,
        path: String,
        field: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, PatchError>;
