//! Command dispatch.

use std::time::Duration;

use anyhow::{bail, Result};
use migralock_core::{
    load_config, Config, Database, DownTarget, LockOptions, UpTarget,
};

use super::{output, AcquireArgs, Cli, Command, LockCommand};

pub async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli).await?;
    let db = Database::connect(&config).await?;

    match cli.command {
        Command::Up { version, through } => {
            let target = through.map_or(UpTarget::Pending, UpTarget::Through);
            let applied = db.migrator().await?.up(&version, target).await?;
            output::migrated("applied", &version, &applied, cli.json)
        }
        Command::Down {
            version,
            through,
            all,
        } => {
            let target = match (through, all) {
                (_, true) => DownTarget::All,
                (Some(id), false) => DownTarget::Through(id),
                (None, false) => DownTarget::Last,
            };
            let reverted = db.migrator().await?.down(&version, target).await?;
            output::migrated("reverted", &version, &reverted, cli.json)
        }
        Command::Status => {
            let status = db.migrator().await?.status().await?;
            output::status(&status, cli.json)
        }
        Command::Version => {
            let version = db.schema_updater().version_store().read().await?;
            output::version(version.as_ref(), cli.json)
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("Refusing to drop the migralock tables without --yes");
            }
            db.migrator().await?.reset().await?;
            output::message("Dropped lock, schema version and migration tables", cli.json)
        }
        Command::Lock(command) => run_lock(&db, command, cli.json).await,
    }
}

async fn run_lock(db: &Database, command: LockCommand, json: bool) -> Result<()> {
    let locks = db.lock_service();
    match command {
        LockCommand::Acquire(args) => {
            let lease = locks.acquire(&args.name, &acquire_options(&args)).await?;
            output::lease(&lease, json)
        }
        LockCommand::Release { name } => {
            locks.release(&name).await?;
            output::message(&format!("Released lock '{name}'"), json)
        }
        LockCommand::Show { name } => {
            let record = locks.find(&name).await?;
            output::lock_record(&name, record.as_ref(), json)
        }
    }
}

/// Config from files and environment, then command-line overrides.
async fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = load_config(cli.config.as_deref()).await?;
    if let Some(url) = &cli.database_url {
        config.database_url.clone_from(url);
    }
    Ok(config)
}

const fn acquire_options(args: &AcquireArgs) -> LockOptions {
    LockOptions {
        timeout: Duration::from_secs(args.timeout),
        max_attempts: args.attempts,
        retry_delay: Duration::from_millis(args.delay),
    }
}
