//! # Migralock Core
//!
//! Named, time-bounded locks kept in a shared `SQLite` store, and schema
//! migrations serialized across processes by one of those locks.
//!
//! - [`lock`]: acquire, release and run-under-lock for any lock name
//! - [`schema`]: the recorded schema version and the `UPDATE_SCHEMA` procedure
//! - [`migration`]: ordered up/down steps applied through the schema updater
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod config;
pub mod db;
pub mod error;
pub mod init;
pub mod lock;
pub mod migration;
pub mod schema;

pub use config::{load_config, Config};
pub use db::Database;
pub use error::{Error, Result};
pub use lock::{LockLease, LockOptions, LockService};
pub use migration::{DownTarget, MigrationState, MigrationStatus, Migrator, UpTarget};
pub use schema::SchemaUpdater;
