//! Singleton record of the applied schema version.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::{
    db::{from_millis, to_millis},
    init::InitGuard,
    Error, Result,
};

/// Fixed id of the single schema version row.
pub const SCHEMA_ROW_ID: &str = "SCHEMA";

/// The stored schema version row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaVersion {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence boundary for the schema version.
#[async_trait::async_trait]
pub trait VersionStore: Send + Sync {
    /// The current version row, absent until the first successful update.
    async fn read(&self) -> Result<Option<SchemaVersion>>;

    /// Create or overwrite the version. Writing the current version again
    /// leaves the row untouched.
    async fn write(&self, version: &str) -> Result<()>;

    /// Drop the backing table.
    async fn drop_storage(&self) -> Result<()>;
}

/// [`VersionStore`] backed by a `SQLite` table.
#[derive(Debug)]
pub struct SqliteVersionStore {
    db: SqlitePool,
    init: InitGuard,
}

impl SqliteVersionStore {
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
                debug!("SchemaVersion table sync ...");
                sqlx::query(
                    "CREATE TABLE IF NOT EXISTS migralock_schema_version (
                        id TEXT PRIMARY KEY NOT NULL,
                        version TEXT NOT NULL,
                        created_at INTEGER NOT NULL,
                        updated_at INTEGER NOT NULL
                    )",
                )
                .execute(&self.db)
                .await
                .map_err(|e| Error::DatabaseError(format!("Failed to create schema version table: {e}")))?;
                Ok(())
            })
            .await
    }
}

#[async_trait::async_trait]
impl VersionStore for SqliteVersionStore {
    async fn read(&self) -> Result<Option<SchemaVersion>> {
        self.ensure_table().await?;

        let row: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT version, created_at, updated_at FROM migralock_schema_version WHERE id = ?",
        )
        .bind(SCHEMA_ROW_ID)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to read schema version: {e}")))?;

        row.map(|(version, created_ms, updated_ms)| {
            Ok(SchemaVersion {
                version,
                created_at: from_millis(created_ms)?,
                updated_at: from_millis(updated_ms)?,
            })
        })
        .transpose()
    }

    async fn write(&self, version: &str) -> Result<()> {
        self.ensure_table().await?;
        info!("Update schema version to {version}");

        let now = to_millis(Utc::now());
        sqlx::query(
            "INSERT INTO migralock_schema_version (id, version, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 version = excluded.version,
                 updated_at = excluded.updated_at
             WHERE migralock_schema_version.version <> excluded.version",
        )
        .bind(SCHEMA_ROW_ID)
        .bind(version)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to update schema version: {e}")))?;

        Ok(())
    }

    async fn drop_storage(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS migralock_schema_version")
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to drop schema version table: {e}")))?;
        self.init.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn setup() -> Result<SqliteVersionStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(SqliteVersionStore::new(pool))
    }

    #[tokio::test]
    async fn absent_until_first_write() -> Result<()> {
        let store = setup().await?;
        assert!(store.read().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn write_then_overwrite() -> Result<()> {
        let store = setup().await?;
        store.write("1.0").await?;
        store.write("2.0").await?;

        let row = store
            .read()
            .await?
            .ok_or_else(|| Error::DatabaseError("missing version row".into()))?;
        assert_eq!(row.version, "2.0");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM migralock_schema_version")
            .fetch_one(&store.db)
            .await?;
        assert_eq!(count.0, 1);
        Ok(())
    }

    #[tokio::test]
    async fn rewriting_same_version_changes_nothing() -> Result<()> {
        let store = setup().await?;
        store.write("2.0").await?;
        let first = store.read().await?;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.write("2.0").await?;

        assert_eq!(store.read().await?, first);
        Ok(())
    }

    #[tokio::test]
    async fn created_at_survives_updates() -> Result<()> {
        let store = setup().await?;
        store.write("1.0").await?;
        let first = store
            .read()
            .await?
            .ok_or_else(|| Error::DatabaseError("missing version row".into()))?;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.write("1.1").await?;
        let second = store
            .read()
            .await?
            .ok_or_else(|| Error::DatabaseError("missing version row".into()))?;

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        Ok(())
    }
}
