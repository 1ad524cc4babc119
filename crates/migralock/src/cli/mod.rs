//! Command-line surface.

pub mod handlers;
pub mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "migralock", version, about = "Run schema migrations under a database lock")]
pub struct Cli {
    /// Config file to use instead of ./migralock.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Database URL, overriding every config layer
    #[arg(long, global = true, value_name = "URL")]
    pub database_url: Option<String>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply pending migrations and record VERSION
    Up {
        version: String,
        /// Stop after this migration id
        #[arg(long, value_name = "ID")]
        through: Option<String>,
    },
    /// Revert applied migrations and record VERSION (default: the last one)
    Down {
        version: String,
        /// Revert every applied migration from this id onwards
        #[arg(long, value_name = "ID", conflicts_with = "all")]
        through: Option<String>,
        /// Revert every applied migration
        #[arg(long)]
        all: bool,
    },
    /// List pending and executed migrations
    Status,
    /// Print the recorded schema version
    Version,
    /// Drop the lock, schema version and migration tables
    Reset {
        /// Confirm the destructive reset
        #[arg(long)]
        yes: bool,
    },
    /// Inspect or manipulate named locks
    #[command(subcommand)]
    Lock(LockCommand),
}

#[derive(Debug, Subcommand)]
pub enum LockCommand {
    /// Acquire a lock and leave it held until released or expired
    Acquire(AcquireArgs),
    /// Release a lock
    Release { name: String },
    /// Show a lock's stored row
    Show { name: String },
}

#[derive(Debug, Args)]
pub struct AcquireArgs {
    pub name: String,
    /// Lock lifetime in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
    /// Attempts before giving up
    #[arg(long, default_value_t = 1)]
    pub attempts: u32,
    /// Milliseconds between attempts
    #[arg(long, default_value_t = 500)]
    pub delay: u64,
}
