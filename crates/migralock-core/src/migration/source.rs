//! Discover SQL migration files in a directory.
//!
//! A file whose name matches the configured pattern becomes one step; its id
//! is the file name without the `.sql` extension. Inside the file the
//! `-- migrate:up` and `-- migrate:down` marker lines split the forward and
//! reverse scripts:
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE users (id INTEGER PRIMARY KEY);
//!
//! -- migrate:down
//! DROP TABLE users;
//! ```
//!
//! A file without markers is a forward-only step.

use std::{io::ErrorKind, path::Path, sync::Arc};

use regex::Regex;
use tracing::{debug, warn};

use super::step::{MigrationStep, SqlStep};
use crate::{config::MigrationConfig, Error, Result};

const UP_MARKER: &str = "-- migrate:up";
const DOWN_MARKER: &str = "-- migrate:down";

/// Load every matching migration file under `config.path`, sorted by id.
///
/// A missing directory yields no steps.
pub async fn discover(config: &MigrationConfig) -> Result<Vec<Arc<dyn MigrationStep>>> {
    let pattern = Regex::new(&config.pattern)?;
    let steps = discover_sql_steps(&config.path, &pattern).await?;
    Ok(steps
        .into_iter()
        .map(|step| Arc::new(step) as Arc<dyn MigrationStep>)
        .collect())
}

/// Load the matching files under `dir` as [`SqlStep`]s, sorted by id.
pub async fn discover_sql_steps(dir: &Path, pattern: &Regex) -> Result<Vec<SqlStep>> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            warn!("Migration path {} is not a directory", dir.display());
            return Ok(Vec::new());
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Migration directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(Error::IoError(format!(
                "Failed to inspect migration directory {}: {e}",
                dir.display()
            )))
        }
    }

    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        Error::IoError(format!(
            "Failed to read migration directory {}: {e}",
            dir.display()
        ))
    })?;

    let mut steps = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !pattern.is_match(file_name) {
            continue;
        }
        let path = entry.path();
        if !tokio::fs::metadata(&path).await?.is_file() {
            continue;
        }

        let id = file_name.strip_suffix(".sql").unwrap_or(file_name);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::IoError(format!("Failed to read migration {file_name}: {e}")))?;
        debug!("Found migration file {file_name}");
        steps.push(parse_sql_migration(id, &contents)?);
    }

    steps.sort_by(|a, b| a.id().cmp(b.id()));
    Ok(steps)
}

/// Split a migration file into its forward and reverse scripts.
pub fn parse_sql_migration(id: &str, contents: &str) -> Result<SqlStep> {
    let mut up = String::new();
    let mut down = String::new();
    let mut saw_down = false;
    let mut in_down = false;

    for line in contents.lines() {
        let marker = line.trim().to_ascii_lowercase();
        if marker == UP_MARKER {
            in_down = false;
            continue;
        }
        if marker == DOWN_MARKER {
            in_down = true;
            saw_down = true;
            continue;
        }
        let target = if in_down { &mut down } else { &mut up };
        target.push_str(line);
        target.push('\n');
    }

    if up.trim().is_empty() {
        return Err(Error::ParseError(format!("Migration '{id}' has no up section")));
    }

    let step = SqlStep::new(id, up.trim());
    if saw_down && !down.trim().is_empty() {
        Ok(step.with_down(down.trim()))
    } else {
        Ok(step)
    }
}
