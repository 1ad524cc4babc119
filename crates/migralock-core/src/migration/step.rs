//! Migration steps: a sortable id plus forward and reverse actions.

use sqlx::SqlitePool;

use crate::{Error, Result};

/// One forward/reverse pair of schema-change actions.
///
/// Steps are ordered by [`MigrationStep::id`] (lexicographic), so ids usually
/// start with a sortable timestamp.
#[async_trait::async_trait]
pub trait MigrationStep: Send + Sync {
    fn id(&self) -> &str;

    /// Apply the step.
    async fn up(&self, db: &SqlitePool) -> Result<()>;

    /// Revert the step.
    async fn down(&self, db: &SqlitePool) -> Result<()>;
}

/// A step whose actions are SQL scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStep {
    id: String,
    up_sql: String,
    down_sql: Option<String>,
}

impl SqlStep {
    pub fn new(id: impl Into<String>, up_sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            up_sql: up_sql.into(),
            down_sql: None,
        }
    }

    #[must_use]
    pub fn with_down(mut self, down_sql: impl Into<String>) -> Self {
        self.down_sql = Some(down_sql.into());
        self
    }

    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    pub fn down_sql(&self) -> Option<&str> {
        self.down_sql.as_deref()
    }
}

#[async_trait::async_trait]
impl MigrationStep for SqlStep {
    fn id(&self) -> &str {
        &self.id
    }

    async fn up(&self, db: &SqlitePool) -> Result<()> {
        sqlx::raw_sql(&self.up_sql)
            .execute(db)
            .await
            .map_err(|e| Error::action(e.to_string()))?;
        Ok(())
    }

    async fn down(&self, db: &SqlitePool) -> Result<()> {
        let sql = self
            .down_sql
            .as_deref()
            .ok_or_else(|| Error::action(format!("Migration '{}' cannot be reverted", self.id)))?;
        sqlx::raw_sql(sql)
            .execute(db)
            .await
            .map_err(|e| Error::action(e.to_string()))?;
        Ok(())
    }
}
