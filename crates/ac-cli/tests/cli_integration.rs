//! CLI integration tests
//!
//! Tests the agent-coder CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;

fn agent_coder() -> Command {
    Command::cargo_bin("agent-coder")
        .expect("Failed to locate agent-coder binary - ensure it's built before running tests")
}

#[test]
fn test_cli_help() {
    agent_coder()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("agent-coder"))
        .stdout(predicate::str::contains("Human-in-the-loop coding agent"));
}

#[test]
fn test_cli_version() {
    agent_coder()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("agent-coder"));
}

#[test]
fn test_cli_run_help() {
    agent_coder()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--branch"))
        .stdout(predicate::str::contains("--endpoint"));
}

#[test]
fn test_cli_rejects_unknown_endpoint() {
    agent_coder()
        .args(["run", "do something", "--endpoint", "carrier-pigeon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("carrier-pigeon"));
}

#[test]
fn test_cli_run_missing_repository() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    agent_coder()
        .args(["run", "do something", "--repo"])
        .arg(&missing)
        .arg("--config")
        .arg(dir.path().join("config.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_ping_without_daemon_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    // Nothing listens on this port during the tests
    std::fs::write(&config, "ipc_port = 1\n").unwrap();

    agent_coder()
        .arg("ping")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not reachable"));
}

#[test]
fn test_cli_send_requires_text() {
    agent_coder()
        .args(["send", "s-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to send"));
}
