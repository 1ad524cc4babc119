//! Configuration loading
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: `<config dir>/migralock/config.toml`
//! 3. Project config: `./migralock.toml`, or the file passed with `--config`
//! 4. Environment variables: `MIGRALOCK_*`
//!
//! # Example Config
//!
//! ```toml
//! database_url = "sqlite:app.db?mode=rwc"
//!
//! [migrations]
//! path = "db/migrations"
//!
//! [lock]
//! max_attempts = 10
//! retry_delay_ms = 2000
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{lock::LockOptions, Error, Result};

/// File names matching this become migration steps.
pub const DEFAULT_MIGRATION_PATTERN: &str = r"^\d{14}_.+\.sql$";

/// Upper bound for `lock.timeout_secs` (30 days).
pub const MAX_LOCK_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// Project config file, relative to the working directory.
pub const PROJECT_CONFIG_FILE: &str = "migralock.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub migrations: MigrationConfig,
    pub lock: LockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Directory scanned for migration files.
    pub path: PathBuf,
    /// Regex a file name must match.
    pub pattern: String,
}

/// Lock policy for schema updates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:migralock.db?mode=rwc".to_string(),
            migrations: MigrationConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("migrations"),
            pattern: DEFAULT_MIGRATION_PATTERN.to_string(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_attempts: 5,
            retry_delay_ms: 5000,
        }
    }
}

impl LockConfig {
    pub const fn schema_update_options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

// A config file layer: only the keys it sets override earlier layers.

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    database_url: Option<String>,
    #[serde(default)]
    migrations: MigrationFile,
    #[serde(default)]
    lock: LockFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MigrationFile {
    path: Option<PathBuf>,
    pattern: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LockFile {
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
}

impl Config {
    /// Parse a TOML document and layer it over `self`.
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let layer: ConfigFile = toml::from_str(content)?;
        self.merge(layer);
        Ok(())
    }

    fn merge(&mut self, other: ConfigFile) {
        if let Some(url) = other.database_url {
            self.database_url = url;
        }
        if let Some(path) = other.migrations.path {
            self.migrations.path = path;
        }
        if let Some(pattern) = other.migrations.pattern {
            self.migrations.pattern = pattern;
        }
        if let Some(timeout) = other.lock.timeout_secs {
            self.lock.timeout_secs = timeout;
        }
        if let Some(attempts) = other.lock.max_attempts {
            self.lock.max_attempts = attempts;
        }
        if let Some(delay) = other.lock.retry_delay_ms {
            self.lock.retry_delay_ms = delay;
        }
    }

    /// Apply `MIGRALOCK_*` environment variable overrides.
    pub fn apply_env_vars(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("MIGRALOCK_DATABASE_URL") {
            self.database_url = value;
        }

        if let Ok(value) = std::env::var("MIGRALOCK_MIGRATIONS_PATH") {
            self.migrations.path = PathBuf::from(value);
        }

        if let Ok(value) = std::env::var("MIGRALOCK_MIGRATIONS_PATTERN") {
            self.migrations.pattern = value;
        }

        if let Ok(value) = std::env::var("MIGRALOCK_LOCK_TIMEOUT_SECS") {
            self.lock.timeout_secs = value.parse().map_err(|e| {
                Error::InvalidConfig(format!("Invalid MIGRALOCK_LOCK_TIMEOUT_SECS value: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("MIGRALOCK_LOCK_MAX_ATTEMPTS") {
            self.lock.max_attempts = value.parse().map_err(|e| {
                Error::InvalidConfig(format!("Invalid MIGRALOCK_LOCK_MAX_ATTEMPTS value: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("MIGRALOCK_LOCK_RETRY_DELAY_MS") {
            self.lock.retry_delay_ms = value.parse().map_err(|e| {
                Error::InvalidConfig(format!("Invalid MIGRALOCK_LOCK_RETRY_DELAY_MS value: {e}"))
            })?;
        }

        Ok(())
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "database_url must not be empty".to_string(),
            ));
        }

        Regex::new(&self.migrations.pattern)?;

        if self.lock.timeout_secs > MAX_LOCK_TIMEOUT_SECS {
            return Err(Error::InvalidConfig(format!(
                "lock.timeout_secs must be at most {MAX_LOCK_TIMEOUT_SECS}"
            )));
        }

        if self.lock.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "lock.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load configuration from all sources.
///
/// `explicit` replaces the project file lookup and must exist.
pub async fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Ok(global_path) = global_config_path() {
        if global_path.exists() {
            load_layer(&mut config, &global_path).await?;
        }
    }

    match explicit {
        Some(path) => load_layer(&mut config, path).await?,
        None => {
            let project_path = PathBuf::from(PROJECT_CONFIG_FILE);
            if project_path.exists() {
                load_layer(&mut config, &project_path).await?;
            }
        }
    }

    config.apply_env_vars()?;
    config.validate()?;

    Ok(config)
}

fn global_config_path() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "migralock")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .ok_or_else(|| Error::IoError("Failed to determine global config directory".to_string()))
}

async fn load_layer(config: &mut Config, path: &Path) -> Result<()> {
    debug!("Loading config from {}", path.display());
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::IoError(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;

    config
        .merge_toml(&content)
        .map_err(|e| Error::ParseError(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    const ENV_VARS: [&str; 6] = [
        "MIGRALOCK_DATABASE_URL",
        "MIGRALOCK_MIGRATIONS_PATH",
        "MIGRALOCK_MIGRATIONS_PATTERN",
        "MIGRALOCK_LOCK_TIMEOUT_SECS",
        "MIGRALOCK_LOCK_MAX_ATTEMPTS",
        "MIGRALOCK_LOCK_RETRY_DELAY_MS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn defaults_match_schema_update_policy() {
        let config = Config::default();
        let options = config.lock.schema_update_options();
        assert_eq!(options.timeout, Duration::from_secs(120));
        assert_eq!(options.max_attempts, 5);
        assert_eq!(options.retry_delay, Duration::from_millis(5000));
        assert_eq!(config.migrations.path, PathBuf::from("migrations"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_values() -> Result<()> {
        let mut config = Config::default();
        config.merge_toml("[lock]\nmax_attempts = 9\n")?;

        assert_eq!(config.lock.max_attempts, 9);
        assert_eq!(config.lock.retry_delay_ms, 5000);
        assert_eq!(config.database_url, Config::default().database_url);
        Ok(())
    }

    #[test]
    fn later_layer_overrides_earlier() -> Result<()> {
        let mut config = Config::default();
        config.merge_toml("database_url = \"sqlite:global.db\"\n[migrations]\npath = \"g\"\n")?;
        config.merge_toml("database_url = \"sqlite:project.db\"\n")?;

        assert_eq!(config.database_url, "sqlite:project.db");
        assert_eq!(config.migrations.path, PathBuf::from("g"));
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut config = Config::default();
        let result = config.merge_toml("databse_url = \"typo\"\n");
        assert!(matches!(result, Err(Error::ParseError(_))));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let empty_url = Config {
            database_url: "  ".to_string(),
            ..Config::default()
        };
        assert!(matches!(empty_url.validate(), Err(Error::InvalidConfig(_))));

        let mut bad_pattern = Config::default();
        bad_pattern.migrations.pattern = "([".to_string();
        assert!(matches!(bad_pattern.validate(), Err(Error::InvalidConfig(_))));

        let mut huge_timeout = Config::default();
        huge_timeout.lock.timeout_secs = 10_000_000_000_000;
        assert!(matches!(huge_timeout.validate(), Err(Error::InvalidConfig(msg)) if msg.contains("timeout_secs")));

        let mut month = Config::default();
        month.lock.timeout_secs = MAX_LOCK_TIMEOUT_SECS;
        assert!(month.validate().is_ok());

        let mut no_attempts = Config::default();
        no_attempts.lock.max_attempts = 0;
        assert!(matches!(no_attempts.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    #[serial]
    fn env_vars_override_config() -> Result<()> {
        clear_env();
        std::env::set_var("MIGRALOCK_DATABASE_URL", "sqlite:env.db");
        std::env::set_var("MIGRALOCK_LOCK_MAX_ATTEMPTS", "3");

        let mut config = Config::default();
        let result = config.apply_env_vars();
        clear_env();
        result?;

        assert_eq!(config.database_url, "sqlite:env.db");
        assert_eq!(config.lock.max_attempts, 3);
        Ok(())
    }

    #[test]
    #[serial]
    fn oversized_timeout_from_env_fails_validation() -> Result<()> {
        clear_env();
        std::env::set_var("MIGRALOCK_LOCK_TIMEOUT_SECS", "10000000000000");

        let mut config = Config::default();
        let applied = config.apply_env_vars();
        clear_env();
        applied?;

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        Ok(())
    }

    #[test]
    #[serial]
    fn invalid_env_number_is_config_error() {
        clear_env();
        std::env::set_var("MIGRALOCK_LOCK_RETRY_DELAY_MS", "soon");

        let mut config = Config::default();
        let result = config.apply_env_vars();
        clear_env();

        assert!(matches!(result, Err(Error::InvalidConfig(msg)) if msg.contains("RETRY_DELAY")));
    }

    #[tokio::test]
    #[serial]
    async fn explicit_file_is_loaded() -> Result<()> {
        clear_env();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("custom.toml");
        tokio::fs::write(&path, "[migrations]\npath = \"db/migrations\"\n").await?;

        let config = load_config(Some(path.as_path())).await?;

        assert_eq!(config.migrations.path, PathBuf::from("db/migrations"));
        Ok(())
    }

    #[tokio::test]
    #[serial]
    async fn missing_explicit_file_is_io_error() {
        clear_env();
        let result = load_config(Some(Path::new("/definitely/not/here.toml"))).await;
        assert!(matches!(result, Err(Error::IoError(_))));
    }

    #[tokio::test]
    async fn malformed_file_names_the_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.toml");
        tokio::fs::write(&path, "database_url = \n [[[").await?;

        let mut config = Config::default();
        let result = load_layer(&mut config, &path).await;

        assert!(matches!(result, Err(Error::ParseError(msg)) if msg.contains("bad.toml")));
        Ok(())
    }
}
