//! Human and JSON rendering of command results.

use anyhow::Result;
use chrono::{DateTime, Utc};
use migralock_core::{
    lock::LockRecord, schema::SchemaVersion, LockLease, MigrationState, MigrationStatus,
};
use serde::Serialize;
use serde_json::json;

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn message(text: &str, json: bool) -> Result<()> {
    if json {
        print_json(&json!({ "message": text }))
    } else {
        println!("{text}");
        Ok(())
    }
}

pub fn migrated(verb: &str, version: &str, ids: &[String], json: bool) -> Result<()> {
    if json {
        return print_json(&json!({ verb: ids, "version": version }));
    }

    if ids.is_empty() {
        println!("Nothing {verb}; schema version is {version}");
    } else {
        for id in ids {
            println!("{verb:>8}  {id}");
        }
        println!("Schema version is {version}");
    }
    Ok(())
}

pub fn status(lines: &[MigrationStatus], json: bool) -> Result<()> {
    if json {
        return print_json(&lines);
    }

    if lines.is_empty() {
        println!("No migrations");
        return Ok(());
    }
    for line in lines {
        let applied = line.applied_at.map(format_time).unwrap_or_default();
        let marker = match line.state {
            MigrationState::Executed => "[x]",
            MigrationState::Pending => "[ ]",
        };
        println!("{marker} {:<48} {applied}", line.migration_id);
    }
    Ok(())
}

pub fn version(row: Option<&SchemaVersion>, json: bool) -> Result<()> {
    if json {
        let value = row.map_or_else(
            || json!({ "version": null }),
            |row| {
                json!({
                    "version": row.version,
                    "created_at": row.created_at,
                    "updated_at": row.updated_at,
                })
            },
        );
        return print_json(&value);
    }

    match row {
        Some(row) => println!("{} (updated {})", row.version, format_time(row.updated_at)),
        None => println!("Schema version is not recorded"),
    }
    Ok(())
}

pub fn lease(lease: &LockLease, json: bool) -> Result<()> {
    if json {
        return print_json(&json!({
            "name": lease.name,
            "expires_at": lease.expires_at,
            "attempt": lease.attempt,
        }));
    }

    println!(
        "Acquired lock '{}' until {} (attempt {})",
        lease.name,
        format_time(lease.expires_at),
        lease.attempt
    );
    Ok(())
}

pub fn lock_record(name: &str, record: Option<&LockRecord>, json: bool) -> Result<()> {
    let live = record.is_some_and(|r| r.is_live(Utc::now()));
    if json {
        let value = record.map_or_else(
            || json!({ "name": name, "held": false }),
            |r| {
                json!({
                    "name": r.name,
                    "held": live,
                    "created_at": r.created_at,
                    "expires_at": r.expires_at,
                })
            },
        );
        return print_json(&value);
    }

    match record {
        Some(r) if live => println!("Lock '{name}' is held until {}", format_time(r.expires_at)),
        Some(r) => println!(
            "Lock '{name}' expired at {} and will be reclaimed",
            format_time(r.expires_at)
        ),
        None => println!("Lock '{name}' is not held"),
    }
    Ok(())
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
