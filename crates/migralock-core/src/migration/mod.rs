//! Versioned migration steps applied under the schema update lock.

pub mod migrator;
pub mod record;
pub mod source;
pub mod step;

pub use migrator::{DownTarget, MigrationState, MigrationStatus, Migrator, MigratorBuilder, UpTarget};
pub use record::{MigrationLog, MigrationRecord, SqliteMigrationLog};
pub use step::{MigrationStep, SqlStep};
