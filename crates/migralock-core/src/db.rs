//! Connection capability and the wired-up facade.
//!
//! The pool is an injected capability: the stores never open connections on
//! their own. [`Database::connect`] is the convenience wiring used by the binary.

use std::{str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::{
    config::Config,
    lock::{LockService, SqliteLockStore},
    migration::{source, Migrator},
    schema::{SchemaUpdater, SqliteVersionStore},
    Error, Result,
};

/// Create a `SQLite` connection pool for the given URL.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| Error::InvalidConfig(format!("Invalid database URL '{database_url}': {e}")))?;

    SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to connect to database: {e}")))
}

/// Milliseconds since the Unix epoch, the stored timestamp format.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::ParseError(format!("Stored timestamp out of range: {ms}")))
}

/// Pool plus the services built on top of it.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    locks: LockService,
    updater: SchemaUpdater,
    config: Config,
}

impl Database {
    /// Connect using the configured URL and wire every store to the same pool.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let pool = connect(&config.database_url).await?;
        Ok(Self::from_pool(pool, config))
    }

    /// Wire the services around an existing pool.
    pub fn from_pool(pool: SqlitePool, config: &Config) -> Self {
        let locks = LockService::new(Arc::new(SqliteLockStore::new(pool.clone())));
        let updater = SchemaUpdater::new(
            locks.clone(),
            Arc::new(SqliteVersionStore::new(pool.clone())),
        )
        .with_options(config.lock.schema_update_options());
        Self {
            pool,
            locks,
            updater,
            config: config.clone(),
        }
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub const fn lock_service(&self) -> &LockService {
        &self.locks
    }

    pub const fn schema_updater(&self) -> &SchemaUpdater {
        &self.updater
    }

    /// Build a migrator over the steps discovered in the configured directory.
    pub async fn migrator(&self) -> Result<Migrator> {
        let steps = source::discover(&self.config.migrations).await?;
        Migrator::builder()
            .pool(self.pool.clone())
            .schema_updater(self.updater.clone())
            .steps(steps)
            .build()
    }
}
