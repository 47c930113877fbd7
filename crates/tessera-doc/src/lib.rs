//! # Tessera Doc
//!
//! The replicated-document side of the bridge. [`DocHandle`] is the
//! interface the bridge needs from a document: run a transaction, observe
//! the structural patches every committed change produces, and wait for
//! the content to become available.
//!
//! [`MemoryDocHandle`] implements it in memory. Replicas can be connected
//! into a network and switched offline, which is enough to exercise the
//! bridge end to end without a real CRDT or transport.

pub mod error;
pub mod handle;
pub mod memory;
pub mod transaction;

pub use error::{DocError, Result};
pub use handle::{
    ChangeEvent, ChangeHandler, ChangeReceipt, Connection, DocHandle, DocSnapshot, HandleStatus,
    HandlerId, Mutator, Origin, ReadyState,
};
pub use memory::{create_network, MemoryDocHandle};
pub use transaction::Transaction;
