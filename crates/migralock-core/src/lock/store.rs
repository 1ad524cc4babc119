//! Table-backed lock rows.
//!
//! A lock is a row keyed by its name. Primary-key uniqueness is the only
//! mutual-exclusion mechanism: among concurrent inserts for the same name the
//! store lets exactly one through.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::{
    db::{from_millis, to_millis},
    init::InitGuard,
    Error, Result,
};

pub(crate) const LOCK_TABLE: &str = "migralock_locks";

/// A stored lock row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// The lock name (primary key).
    pub name: String,
    /// The lock is live while `expires_at` is strictly in the future.
    pub expires_at: DateTime<Utc>,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
}

impl LockRecord {
    /// Whether the lock is still live as observed at `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Persistence boundary for lock rows.
#[async_trait::async_trait]
pub trait LockStore: Send + Sync {
    /// Insert a row for `name`.
    ///
    /// Returns `Ok(false)` when a row with that name already exists.
    async fn create_if_absent(
        &self,
        name: &str,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Remove every row with `expires_at <= now`. Returns the number removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Remove the row for `name`. Deleting an absent name is not an error.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Fetch the row for `name`, live or not.
    async fn find(&self, name: &str) -> Result<Option<LockRecord>>;

    /// Drop the backing table.
    async fn drop_storage(&self) -> Result<()>;
}

/// [`LockStore`] backed by a `SQLite` table.
#[derive(Debug)]
pub struct SqliteLockStore {
    db: SqlitePool,
    init: InitGuard,
}

impl SqliteLockStore {
    #[must_use]
    pub const fn new(db: SqlitePool) -> Self {
        Self {
            db,
            init: InitGuard::new(),
        }
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.db
    }

    async fn ensure_table(&self) -> Result<()> {
        self.init
            .ensure(|| async {
                debug!("Creating table {LOCK_TABLE} if needed");
                sqlx::query(
                    "CREATE TABLE IF NOT EXISTS migralock_locks (
                        name TEXT PRIMARY KEY NOT NULL,
                        expires_at INTEGER NOT NULL,
                        created_at INTEGER NOT NULL
                    )",
                )
                .execute(&self.db)
                .await
                .map_err(|e| Error::DatabaseError(format!("Failed to create lock table: {e}")))?;
                Ok(())
            })
            .await
    }
}

/// Whether the insert failed only because the key is taken.
fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[async_trait::async_trait]
impl LockStore for SqliteLockStore {
    async fn create_if_absent(
        &self,
        name: &str,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.ensure_table().await?;

        let inserted = sqlx::query(
            "INSERT INTO migralock_locks (name, expires_at, created_at) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(to_millis(expires_at))
        .bind(to_millis(created_at))
        .execute(&self.db)
        .await;

        match inserted {
            Ok(_) => Ok(true),
            Err(e) if is_contention(&e) => Ok(false),
            Err(e) => Err(Error::DatabaseError(format!("Failed to create lock '{name}': {e}"))),
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.ensure_table().await?;

        let result = sqlx::query("DELETE FROM migralock_locks WHERE expires_at <= ?")
            .bind(to_millis(now))
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to delete expired locks: {e}")))?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.ensure_table().await?;

        let result = sqlx::query("DELETE FROM migralock_locks WHERE name = ?")
            .bind(name)
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to delete lock '{name}': {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, name: &str) -> Result<Option<LockRecord>> {
        self.ensure_table().await?;

        let row: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT name, expires_at, created_at FROM migralock_locks WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        row.map(|(name, expires_ms, created_ms)| {
            Ok(LockRecord {
                name,
                expires_at: from_millis(expires_ms)?,
                created_at: from_millis(created_ms)?,
            })
        })
        .transpose()
    }

    async fn drop_storage(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS migralock_locks")
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to drop lock table: {e}")))?;
        self.init.reset();
        Ok(())
    }
}
