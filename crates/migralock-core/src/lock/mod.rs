//! Named, time-bounded mutual exclusion backed by the shared store.

pub mod service;
pub mod store;

pub use service::{LockLease, LockOptions, LockService};
pub use store::{LockRecord, LockStore, SqliteLockStore};
