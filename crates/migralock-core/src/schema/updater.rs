//! Serializes schema changes across processes.
//!
//! 1. Take the `UPDATE_SCHEMA` lock
//! 2. Run the caller's action
//! 3. If it succeeded, record the new schema version
//! 4. Release the lock (whatever happened in 2 and 3)

use std::{future::Future, sync::Arc, time::Duration};

use sqlx::SqlitePool;

use super::version::{SqliteVersionStore, VersionStore};
use crate::{
    lock::{LockOptions, LockService},
    Error, Result,
};

/// Lock taken around every schema update.
pub const UPDATE_SCHEMA_LOCK: &str = "UPDATE_SCHEMA";

/// Lock options used for schema updates unless overridden:
/// 120s timeout, 5 attempts, 5s apart.
#[must_use]
pub fn default_update_options() -> LockOptions {
    LockOptions::new()
        .with_timeout(Duration::from_secs(120))
        .with_max_attempts(5)
        .with_retry_delay(Duration::from_millis(5000))
}

/// Runs schema-changing actions under [`UPDATE_SCHEMA_LOCK`].
#[derive(Clone)]
pub struct SchemaUpdater {
    locks: LockService,
    versions: Arc<dyn VersionStore>,
    options: LockOptions,
}

impl std::fmt::Debug for SchemaUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaUpdater")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SchemaUpdater {
    #[must_use]
    pub fn new(locks: LockService, versions: Arc<dyn VersionStore>) -> Self {
        Self {
            locks,
            versions,
            options: default_update_options(),
        }
    }

    /// Updater whose lock and version tables both live in `db`.
    #[must_use]
    pub fn sqlite(db: SqlitePool) -> Self {
        Self::new(
            LockService::sqlite(db.clone()),
            Arc::new(SqliteVersionStore::new(db)),
        )
    }

    #[must_use]
    pub const fn with_options(mut self, options: LockOptions) -> Self {
        self.options = options;
        self
    }

    pub const fn options(&self) -> &LockOptions {
        &self.options
    }

    pub const fn lock_service(&self) -> &LockService {
        &self.locks
    }

    pub fn version_store(&self) -> &Arc<dyn VersionStore> {
        &self.versions
    }

    /// The currently recorded schema version.
    pub async fn current_version(&self) -> Result<Option<String>> {
        Ok(self.versions.read().await?.map(|row| row.version))
    }

    /// Run `action` under the schema lock, then record `version`.
    ///
    /// An empty `version` fails with [`Error::InvalidVersion`] before the lock
    /// is touched. If `action` fails the version is left as it was and the
    /// failure propagates. If the lock cannot be acquired `action` never runs.
    pub async fn update_schema<F, Fut, T, E>(
        &self,
        version: &str,
        action: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        if version.is_empty() {
            return Err(Error::InvalidVersion.into());
        }

        self.locks
            .with_lock(UPDATE_SCHEMA_LOCK, &self.options, || async {
                let value = action().await?;
                self.versions.write(version).await?;
                Ok(value)
            })
            .await
    }
}
