//! Error types for migralock-core

use thiserror::Error;

/// Core error type for lock and migration operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Every acquisition attempt found the lock held by someone else
    #[error("Cannot acquire the lock '{name}' after {attempts} attempt(s)")]
    LockUnavailable { name: String, attempts: u32 },

    /// Empty schema version passed to a schema update
    #[error("Schema version is not defined")]
    InvalidVersion,

    /// A caller-supplied protected action failed
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// A migration step failed part way through an up/down run
    #[error("Migration '{migration_id}' failed: {reason}")]
    MigrationFailed {
        migration_id: String,
        /// Steps that completed in the same call before the failure
        completed: Vec<String>,
        reason: String,
    },

    /// A migration id that no supplied step or stored record knows about
    #[error("Unknown migration: {0}")]
    UnknownMigration(String),

    /// The shared store could not be reached or rejected the statement
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem errors while loading config or migration files
    #[error("IO error: {0}")]
    IoError(String),

    /// Malformed config, migration file or stored value
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl Error {
    /// Stable machine-readable code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::LockUnavailable { .. } => "LOCK_UNAVAILABLE",
            Self::InvalidVersion => "INVALID_VERSION",
            Self::ActionFailed(_) => "ACTION_FAILED",
            Self::MigrationFailed { .. } => "MIGRATION_FAILED",
            Self::UnknownMigration(_) => "UNKNOWN_MIGRATION",
            Self::DatabaseError(_) => "STORE_UNAVAILABLE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::IoError(_) => "IO_ERROR",
            Self::ParseError(_) => "PARSE_ERROR",
        }
    }

    /// Process exit code for this error.
    ///
    /// - 1: bad input or configuration
    /// - 2: IO or store failure
    /// - 3: unknown migration
    /// - 4: lock contention
    /// - 5: a protected action or migration step failed
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidVersion | Self::InvalidConfig(_) | Self::ParseError(_) => 1,
            Self::DatabaseError(_) | Self::IoError(_) => 2,
            Self::UnknownMigration(_) => 3,
            Self::LockUnavailable { .. } => 4,
            Self::ActionFailed(_) | Self::MigrationFailed { .. } => 5,
        }
    }

    /// Wrap an arbitrary failure from a protected action.
    pub fn action(msg: impl Into<String>) -> Self {
        Self::ActionFailed(msg.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::ParseError(format!("Failed to parse config: {err}"))
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::InvalidConfig(format!("Invalid migration pattern: {err}"))
    }
}

/// Result type alias for migralock-core operations
pub type Result<T> = std::result::Result<T, Error>;
