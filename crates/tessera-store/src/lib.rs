//! # Tessera Store
//!
//! The local side of the bridge: a keyed collection of records that an
//! editor reads and writes, with listeners that see each mutation batch
//! tagged by where it came from.
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::Record;
//! use tessera_store::{ChangeSource, ListenFilter, Store};
//!
//! let store = Store::new();
//! store.listen(ListenFilter::all().source(ChangeSource::User), |change| {
//!     println!("{} records changed", change.changes.len());
//! });
//! store.put([Record::new("shape:a").with("x", 10)]);
//! ```

pub mod diff;
pub mod source;
pub mod store;

pub use diff::{ChangeSource, RecordsDiff, StoreChange};
pub use source::RecordSource;
pub use store::{ListenFilter, ListenerId, Store, StoreListener};
