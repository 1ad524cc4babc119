//! Schema version bookkeeping and the locked update procedure.

pub mod updater;
pub mod version;

pub use updater::{default_update_options, SchemaUpdater, UPDATE_SCHEMA_LOCK};
pub use version::{SchemaVersion, SqliteVersionStore, VersionStore};
