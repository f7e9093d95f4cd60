//! Smoke tests -- verify the binary runs and the CLI drives the incident log.

use assert_cmd::Command;
use predicates::str::contains;

fn tailguard(data: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("tailguard").unwrap();
    cmd.env_remove("TAILGUARD_CONFIG")
        .env("RUST_LOG", "error")
        .arg("--data")
        .arg(data);
    cmd
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("tailguard")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Tailgating detection backend"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("tailguard")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("tailguard"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("tailguard")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_incidents_list_subcommand_exists() {
    Command::cargo_bin("tailguard")
        .unwrap()
        .args(["incidents", "list", "--help"])
        .assert()
        .success();
}

#[test]
fn test_report_then_list_and_stats() {
    let dir = tempfile::TempDir::new().unwrap();
    let data = dir.path().join("incidents.json");

    tailguard(&data)
        .args(["report", "--persons", "3", "--location", r#"{"gate":"A"}"#])
        .args(["--timestamp", "2024-01-01T10:00:00"])
        .assert()
        .success()
        .stdout(contains("Incident 1 recorded"));

    tailguard(&data)
        .args(["incidents", "list"])
        .assert()
        .success()
        .stdout(contains("2024-01-01T10:00:00"))
        .stdout(contains("MANUAL_REPORT"));

    tailguard(&data)
        .args(["stats", "--json"])
        .assert()
        .success()
        .stdout(contains("\"total\": 1"));
}

#[test]
fn test_show_unknown_incident_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let data = dir.path().join("incidents.json");

    tailguard(&data)
        .args(["incidents", "show", "42"])
        .assert()
        .failure()
        .stderr(contains("incident 42 not found"));
}

#[test]
fn test_report_rejects_zero_persons() {
    let dir = tempfile::TempDir::new().unwrap();
    let data = dir.path().join("incidents.json");

    tailguard(&data)
        .args(["report", "--persons", "0"])
        .assert()
        .failure();
    assert!(!data.exists());
}

#[test]
fn test_config_load_is_logged() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("tailguard.toml");
    std::fs::write(&config, "[logging]\nlevel = \"info\"\n").unwrap();

    Command::cargo_bin("tailguard")
        .unwrap()
        .env_remove("TAILGUARD_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&config)
        .arg("--data")
        .arg(dir.path().join("incidents.json"))
        .args(["stats", "--json"])
        .assert()
        .success()
        .stderr(contains("loaded tailguard configuration"));
}

#[test]
fn test_unreadable_env_config_falls_back_to_defaults() {
    let dir = tempfile::TempDir::new().unwrap();

    Command::cargo_bin("tailguard")
        .unwrap()
        .env("TAILGUARD_CONFIG", dir.path().join("missing.toml"))
        .env_remove("RUST_LOG")
        .arg("--data")
        .arg(dir.path().join("incidents.json"))
        .args(["stats", "--json"])
        .assert()
        .success()
        .stdout(contains("\"total\": 0"))
        .stderr(contains("TAILGUARD_CONFIG set but file could not be loaded"));
}

#[test]
fn test_explicit_missing_config_fails() {
    let dir = tempfile::TempDir::new().unwrap();

    tailguard(&dir.path().join("incidents.json"))
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .args(["stats"])
        .assert()
        .failure()
        .stderr(contains("failed to read config file"));
}
