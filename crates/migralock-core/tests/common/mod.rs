//! Shared fixtures for migralock-core integration tests.
//!
//! Each call to [`TestDb::pool`] opens an independent pool on the same file,
//! which stands in for a separate process.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use migralock_core::{config::LockConfig, Config, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tempfile::TempDir;

pub struct TestDb {
    dir: TempDir,
    path: PathBuf,
}

impl TestDb {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("shared.db");
        Ok(Self { dir, path })
    }

    pub fn url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path.display())
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub async fn pool(&self) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true);
        Ok(SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?)
    }

    /// Config pointing at this database and `migrations_dir`, with a lock
    /// policy short enough for tests.
    pub fn config(&self, migrations_dir: &Path) -> Config {
        let mut config = Config {
            database_url: self.url(),
            ..Config::default()
        };
        config.migrations.path = migrations_dir.to_path_buf();
        config.lock = LockConfig {
            timeout_secs: 30,
            max_attempts: 200,
            retry_delay_ms: 10,
        };
        config
    }
}

pub fn write_migration(dir: &Path, file_name: &str, up: &str, down: &str) -> Result<()> {
    std::fs::write(
        dir.join(file_name),
        format!("-- migrate:up\n{up}\n\n-- migrate:down\n{down}\n"),
    )?;
    Ok(())
}
