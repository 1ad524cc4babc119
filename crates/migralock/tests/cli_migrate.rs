//! Binary tests: each runs `migralock` in a scratch project directory.

use std::{fs, path::Path};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn project() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let migrations = dir.path().join("migrations");
    fs::create_dir(&migrations).expect("migrations dir");
    fs::write(
        migrations.join("20240101000000_create_users.sql"),
        "-- migrate:up\nCREATE TABLE users (id INTEGER PRIMARY KEY);\n-- migrate:down\nDROP TABLE users;\n",
    )
    .expect("write migration");
    fs::write(
        migrations.join("20240102000000_create_posts.sql"),
        "-- migrate:up\nCREATE TABLE posts (id INTEGER PRIMARY KEY);\n-- migrate:down\nDROP TABLE posts;\n",
    )
    .expect("write migration");
    fs::write(
        dir.path().join("migralock.toml"),
        "database_url = \"sqlite:app.db?mode=rwc\"\n\n[lock]\nmax_attempts = 1\nretry_delay_ms = 10\n",
    )
    .expect("write config");
    dir
}

fn migralock(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_migralock"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("xdg"))
        .env("RUST_LOG", "warn");
    for var in [
        "MIGRALOCK_DATABASE_URL",
        "MIGRALOCK_MIGRATIONS_PATH",
        "MIGRALOCK_MIGRATIONS_PATTERN",
        "MIGRALOCK_LOCK_TIMEOUT_SECS",
        "MIGRALOCK_LOCK_MAX_ATTEMPTS",
        "MIGRALOCK_LOCK_RETRY_DELAY_MS",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn status_lists_pending_migrations() {
    let dir = project();
    migralock(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[ ] 20240101000000_create_users"))
        .stdout(predicate::str::contains("[ ] 20240102000000_create_posts"));
}

#[test]
fn up_applies_and_records_version() {
    let dir = project();
    migralock(dir.path())
        .args(["up", "1.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("20240102000000_create_posts"))
        .stdout(predicate::str::contains("Schema version is 1.0"));

    migralock(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("1.0"));

    migralock(dir.path())
        .args(["up", "1.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing applied"));
}

#[test]
fn status_json_reports_states() {
    let dir = project();
    migralock(dir.path())
        .args(["up", "0.5", "--through", "20240101000000_create_users"])
        .assert()
        .success();

    let output = migralock(dir.path())
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success());

    let lines: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(lines[0]["state"], "executed");
    assert_eq!(lines[1]["migration_id"], "20240102000000_create_posts");
    assert_eq!(lines[1]["state"], "pending");
}

#[test]
fn down_reverts_last_by_default() {
    let dir = project();
    migralock(dir.path()).args(["up", "1.0"]).assert().success();

    migralock(dir.path())
        .args(["down", "0.9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("20240102000000_create_posts"))
        .stdout(predicate::str::contains("20240101000000_create_users").not());
}

#[test]
fn unknown_target_exits_with_code_3() {
    let dir = project();
    migralock(dir.path())
        .args(["up", "1.0", "--through", "20991231000000_missing"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown migration"));
}

#[test]
fn held_lock_blocks_up_with_code_4() {
    let dir = project();
    migralock(dir.path())
        .args(["lock", "acquire", "UPDATE_SCHEMA", "--timeout", "300"])
        .assert()
        .success();

    migralock(dir.path())
        .args(["up", "1.0"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Cannot acquire the lock 'UPDATE_SCHEMA'"));

    migralock(dir.path())
        .args(["lock", "release", "UPDATE_SCHEMA"])
        .assert()
        .success();
    migralock(dir.path()).args(["up", "1.0"]).assert().success();
}

#[test]
fn lock_show_reports_holder() {
    let dir = project();
    migralock(dir.path())
        .args(["lock", "show", "jobs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is not held"));

    migralock(dir.path())
        .args(["lock", "acquire", "jobs"])
        .assert()
        .success();

    migralock(dir.path())
        .args(["lock", "show", "jobs", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"held\": true"));
}

#[test]
fn reset_requires_confirmation() {
    let dir = project();
    migralock(dir.path()).args(["up", "1.0"]).assert().success();

    migralock(dir.path())
        .arg("reset")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));

    migralock(dir.path())
        .args(["reset", "--yes"])
        .assert()
        .success();

    migralock(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("not recorded"));
}

#[test]
fn empty_version_is_rejected() {
    let dir = project();
    migralock(dir.path())
        .args(["up", ""])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Schema version is not defined"));
}

#[test]
fn database_url_flag_overrides_config() {
    let dir = project();
    migralock(dir.path())
        .args(["up", "1.0", "--database-url", "sqlite:other.db?mode=rwc"])
        .assert()
        .success();
    assert!(dir.path().join("other.db").exists());
}

#[test]
fn oversized_lock_timeout_is_an_error_not_a_crash() {
    let dir = project();
    migralock(dir.path())
        .args(["lock", "acquire", "jobs", "--timeout", "10000000000000"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("out of range"));

    migralock(dir.path())
        .args(["lock", "show", "jobs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is not held"));
}
