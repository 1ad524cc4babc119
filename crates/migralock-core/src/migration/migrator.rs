//! Applies and reverts migration steps under the schema update lock.
//!
//! Which steps are pending is recomputed after the lock is taken, so two
//! processes migrating the same database never run the same step twice.
//! Progress is recorded step by step: if a step fails, the steps before it
//! in the same call stay recorded and the schema version is not advanced.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use super::{
    record::{MigrationLog, SqliteMigrationLog},
    step::MigrationStep,
};
use crate::{lock::LockOptions, schema::SchemaUpdater, Error, Result};

/// How far [`Migrator::up`] goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UpTarget {
    /// Every pending step.
    #[default]
    Pending,
    /// Pending steps up to and including this id.
    Through(String),
}

/// How far [`Migrator::down`] goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DownTarget {
    /// Only the most recently applied step.
    #[default]
    Last,
    /// Every applied step with an id at or after this one.
    Through(String),
    /// Every applied step.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MigrationState {
    Pending,
    Executed,
}

/// One line of [`Migrator::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub migration_id: String,
    pub state: MigrationState,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Sequences migration steps through a [`SchemaUpdater`].
pub struct Migrator {
    db: SqlitePool,
    updater: SchemaUpdater,
    log: Arc<dyn MigrationLog>,
    steps: Vec<Arc<dyn MigrationStep>>,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("steps", &self.step_ids())
            .field("updater", &self.updater)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Migrator`]; the pool is required.
#[derive(Default)]
pub struct MigratorBuilder {
    pool: Option<SqlitePool>,
    updater: Option<SchemaUpdater>,
    log: Option<Arc<dyn MigrationLog>>,
    lock_options: Option<LockOptions>,
    steps: Vec<Arc<dyn MigrationStep>>,
}

impl MigratorBuilder {
    /// Connection handed to every step and used by the default stores.
    #[must_use]
    pub fn pool(mut self, pool: SqlitePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Use an existing updater instead of one over the pool's tables.
    #[must_use]
    pub fn schema_updater(mut self, updater: SchemaUpdater) -> Self {
        self.updater = Some(updater);
        self
    }

    #[must_use]
    pub fn migration_log(mut self, log: Arc<dyn MigrationLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Override the schema update lock options.
    #[must_use]
    pub const fn lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = Some(options);
        self
    }

    #[must_use]
    pub fn step(mut self, step: Arc<dyn MigrationStep>) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn steps(mut self, steps: impl IntoIterator<Item = Arc<dyn MigrationStep>>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Validate and build.
    ///
    /// Fails with [`Error::InvalidConfig`] when no pool was given, or when two
    /// steps share an id.
    pub fn build(self) -> Result<Migrator> {
        let pool = self
            .pool
            .ok_or_else(|| Error::InvalidConfig("Migrator requires a database pool".into()))?;

        let mut seen = HashSet::new();
        if let Some(dup) = self.steps.iter().find(|s| !seen.insert(s.id().to_string())) {
            return Err(Error::InvalidConfig(format!(
                "Duplicate migration id '{}'",
                dup.id()
            )));
        }
        if self.steps.iter().any(|s| s.id().is_empty()) {
            return Err(Error::InvalidConfig("Migration ids cannot be empty".into()));
        }

        let mut steps = self.steps;
        steps.sort_by(|a, b| a.id().cmp(b.id()));

        let mut updater = self
            .updater
            .unwrap_or_else(|| SchemaUpdater::sqlite(pool.clone()));
        if let Some(options) = self.lock_options {
            updater = updater.with_options(options);
        }
        let log = self
            .log
            .unwrap_or_else(|| Arc::new(SqliteMigrationLog::new(pool.clone())));

        Ok(Migrator {
            db: pool,
            updater,
            log,
            steps,
        })
    }
}

impl Migrator {
    #[must_use]
    pub fn builder() -> MigratorBuilder {
        MigratorBuilder::default()
    }

    /// Supplied step ids, ascending.
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    pub const fn schema_updater(&self) -> &SchemaUpdater {
        &self.updater
    }

    /// The recorded schema version.
    pub async fn current_version(&self) -> Result<Option<String>> {
        self.updater.current_version().await
    }

    /// Ids of applied steps, ascending.
    pub async fn executed(&self) -> Result<Vec<String>> {
        Ok(self
            .log
            .executed()
            .await?
            .into_iter()
            .map(|r| r.migration_id)
            .collect())
    }

    /// Ids of supplied steps not yet applied, ascending.
    pub async fn pending(&self) -> Result<Vec<String>> {
        let executed: HashSet<String> = self.executed().await?.into_iter().collect();
        Ok(self
            .steps
            .iter()
            .filter(|s| !executed.contains(s.id()))
            .map(|s| s.id().to_string())
            .collect())
    }

    /// Apply pending steps under the schema lock, then record `version`.
    ///
    /// Returns the ids applied by this call (empty when nothing was pending).
    /// On a step failure returns [`Error::MigrationFailed`] carrying the ids
    /// applied before it.
    pub async fn up(&self, version: &str, target: UpTarget) -> Result<Vec<String>> {
        if let UpTarget::Through(id) = &target {
            self.require_step(id)?;
        }

        self.updater
            .update_schema(version, || async {
                let executed: HashSet<String> = self.executed().await?.into_iter().collect();
                let pending: Vec<&Arc<dyn MigrationStep>> = self
                    .steps
                    .iter()
                    .filter(|s| !executed.contains(s.id()))
                    .filter(|s| match &target {
                        UpTarget::Pending => true,
                        UpTarget::Through(last) => s.id() <= last.as_str(),
                    })
                    .collect();

                if pending.is_empty() {
                    info!("There is no pending migration files");
                    return Ok::<_, Error>(Vec::new());
                }

                let mut applied = Vec::with_capacity(pending.len());
                for step in pending {
                    info!(migration = step.id(), "Migration up ...");
                    let outcome = match step.up(&self.db).await {
                        Ok(()) => self.log.log(step.id()).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = outcome {
                        return Err(step_failed(step.id(), applied, &e));
                    }
                    applied.push(step.id().to_string());
                }

                info!("Executed migration files: {}", applied.join(", "));
                Ok(applied)
            })
            .await
    }

    /// Revert applied steps, newest first, under the schema lock, then record
    /// `version`.
    ///
    /// Returns the ids reverted by this call. Every step to revert must be
    /// supplied; otherwise [`Error::UnknownMigration`] is returned before
    /// anything is reverted.
    pub async fn down(&self, version: &str, target: DownTarget) -> Result<Vec<String>> {
        if let DownTarget::Through(id) = &target {
            self.require_step(id)?;
        }

        self.updater
            .update_schema(version, || async {
                let mut executed = self.executed().await?;
                executed.reverse();
                let selected: Vec<String> = match &target {
                    DownTarget::Last => executed.into_iter().take(1).collect(),
                    DownTarget::Through(first) => executed
                        .into_iter()
                        .filter(|id| id.as_str() >= first.as_str())
                        .collect(),
                    DownTarget::All => executed,
                };

                let mut to_revert = Vec::with_capacity(selected.len());
                for id in &selected {
                    let step = self
                        .find_step(id)
                        .ok_or_else(|| Error::UnknownMigration(id.clone()))?;
                    to_revert.push(step);
                }

                if to_revert.is_empty() {
                    info!("All migration files have been reverted");
                    return Ok::<_, Error>(Vec::new());
                }

                let mut reverted = Vec::with_capacity(to_revert.len());
                for step in to_revert {
                    info!(migration = step.id(), "Migration down ...");
                    let outcome = match step.down(&self.db).await {
                        Ok(()) => self.log.unlog(step.id()).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = outcome {
                        return Err(step_failed(step.id(), reverted, &e));
                    }
                    reverted.push(step.id().to_string());
                }

                info!("Reverted migration files: {}", reverted.join(", "));
                Ok(reverted)
            })
            .await
    }

    /// Pending and executed steps, ascending by id. Takes no lock.
    ///
    /// Records whose step is no longer supplied are listed as executed.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let mut lines: BTreeMap<String, MigrationStatus> = self
            .steps
            .iter()
            .map(|s| {
                (
                    s.id().to_string(),
                    MigrationStatus {
                        migration_id: s.id().to_string(),
                        state: MigrationState::Pending,
                        applied_at: None,
                    },
                )
            })
            .collect();

        for record in self.log.executed().await? {
            lines.insert(
                record.migration_id.clone(),
                MigrationStatus {
                    migration_id: record.migration_id,
                    state: MigrationState::Executed,
                    applied_at: Some(record.applied_at),
                },
            );
        }

        Ok(lines.into_values().collect())
    }

    /// Drop the lock, schema version and migration record tables.
    ///
    /// Destructive; never called implicitly.
    pub async fn reset(&self) -> Result<()> {
        info!("Drop all tables");
        self.updater.lock_service().store().drop_storage().await?;
        self.updater.version_store().drop_storage().await?;
        self.log.drop_storage().await
    }

    fn find_step(&self, id: &str) -> Option<&Arc<dyn MigrationStep>> {
        self.steps
            .binary_search_by(|s| s.id().cmp(id))
            .ok()
            .and_then(|idx| self.steps.get(idx))
    }

    fn require_step(&self, id: &str) -> Result<()> {
        self.find_step(id)
            .map(|_| ())
            .ok_or_else(|| Error::UnknownMigration(id.to_string()))
    }
}

fn step_failed(migration_id: &str, completed: Vec<String>, err: &Error) -> Error {
    let reason = match err {
        Error::ActionFailed(msg) => msg.clone(),
        other => other.to_string(),
    };
    Error::MigrationFailed {
        migration_id: migration_id.to_string(),
        completed,
        reason,
    }
}
