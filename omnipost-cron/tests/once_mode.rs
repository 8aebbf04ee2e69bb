//! Integration tests for omnipost-cron --once

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Setup a temp config pointing at a fresh database
fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");

    let config_content = format!(
        r#"
[database]
path = "{}"
"#,
        db_path.display().to_string().replace('\\', "/")
    );
    fs::write(&config_path, config_content).unwrap();

    let config_str = config_path.to_string_lossy().to_string();
    (temp_dir, config_str)
}

#[test]
fn test_once_prints_json_report() {
    let (_temp_dir, config_path) = setup_test_env();

    let mut cmd = Command::cargo_bin("omnipost-cron").unwrap();
    cmd.arg("--once")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\": true"))
        .stdout(predicate::str::contains("\"publishing\""));
}

#[test]
fn test_once_is_repeatable() {
    let (_temp_dir, config_path) = setup_test_env();

    for _ in 0..2 {
        Command::cargo_bin("omnipost-cron")
            .unwrap()
            .arg("--once")
            .arg("--config")
            .arg(&config_path)
            .assert()
            .success();
    }
}

#[test]
fn test_missing_config_fails() {
    let mut cmd = Command::cargo_bin("omnipost-cron").unwrap();
    cmd.arg("--once")
        .arg("--config")
        .arg("/nonexistent/omnipost.toml")
        .assert()
        .failure();
}

#[test]
fn test_server_mode_without_secret_fails() {
    let (_temp_dir, config_path) = setup_test_env();

    let mut cmd = Command::cargo_bin("omnipost-cron").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .env_remove("OMNIPOST_CRON_SECRET")
        .assert()
        .failure()
        .code(1);
}
