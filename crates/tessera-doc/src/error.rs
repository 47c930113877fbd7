//! Error types for document handles.

use tessera_core::{PatchError, RecordId};
use thiserror::Error;

/// Errors returned by document handles and transactions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    #[error("A transaction is already in flight on this handle")]
    TransactionInFlight,

    #[error("Document is still loading")]
    NotReady,

    #[error("Document is unavailable")]
    Unavailable,

    #[error("Record {0} must be a JSON object")]
    NotAnObject(RecordId),

    #[error("Transaction aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Path(#[from] PatchError),
}

pub type Result<T> = std::result::Result<T, DocError>;
