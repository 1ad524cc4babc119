//! Bookkeeping of applied migration steps.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::{
    db::{from_millis, to_millis},
    init::InitGuard,
    Error, Result,
};

/// One applied, not yet reverted, migration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub migration_id: String,
    pub applied_at: DateTime<Utc>,
}

/// Persistence boundary for migration records.
#[async_trait::async_trait]
pub trait MigrationLog: Send + Sync {
    /// Every record, ascending by id.
    async fn executed(&self) -> Result<Vec<MigrationRecord>>;

    /// Record that `migration_id` was applied.
    async fn log(&self, migration_id: &str) -> Result<()>;

    /// Forget `migration_id` after it was reverted.
    async fn unlog(&self, migration_id: &str) -> Result<()>;

    /// Drop the backing table.
    async fn drop_storage(&self) -> Result<()>;
}

/// [`MigrationLog`] backed by a `SQLite` table.
#[derive(Debug)]
pub struct SqliteMigrationLog {
    db: SqlitePool,
    init: InitGuard,
}

impl SqliteMigrationLog {
    #[must_use]
    pub const fn new(db: SqlitePool) -> Self {
        Self {
            db,
            init: InitGuard::new(),
        }
    }

    async fn ensure_table(&self) -> Result<()> {
        self.init
            .ensure(|| async {
                debug!("Migration record table sync ...");
                sqlx::query(
                    "CREATE TABLE IF NOT EXISTS migralock_migrations (
                        migration_id TEXT PRIMARY KEY NOT NULL,
                        applied_at INTEGER NOT NULL
                    )",
                )
                .execute(&self.db)
                .await
                .map_err(|e| Error::DatabaseError(format!("Failed to create migration table: {e}")))?;
                Ok(())
            })
            .await
    }
}

#[async_trait::async_trait]
impl MigrationLog for SqliteMigrationLog {
    async fn executed(&self) -> Result<Vec<MigrationRecord>> {
        self.ensure_table().await?;

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT migration_id, applied_at FROM migralock_migrations ORDER BY migration_id ASC",
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to list executed migrations: {e}")))?;

        rows.into_iter()
            .map(|(migration_id, applied_ms)| {
                Ok(MigrationRecord {
                    migration_id,
                    applied_at: from_millis(applied_ms)?,
                })
            })
            .collect()
    }

    async fn log(&self, migration_id: &str) -> Result<()> {
        self.ensure_table().await?;

        sqlx::query("INSERT INTO migralock_migrations (migration_id, applied_at) VALUES (?, ?)")
            .bind(migration_id)
            .bind(to_millis(Utc::now()))
            .execute(&self.db)
            .await
            .map_err(|e| {
                Error::DatabaseError(format!("Failed to record migration '{migration_id}': {e}"))
            })?;
        Ok(())
    }

    async fn unlog(&self, migration_id: &str) -> Result<()> {
        self.ensure_table().await?;

        sqlx::query("DELETE FROM migralock_migrations WHERE migration_id = ?")
            .bind(migration_id)
            .execute(&self.db)
            .await
            .map_err(|e| {
                Error::DatabaseError(format!("Failed to remove migration '{migration_id}': {e}"))
            })?;
        Ok(())
    }

    async fn drop_storage(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS migralock_migrations")
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to drop migration table: {e}")))?;
        self.init.reset();
        Ok(())
    }
}
