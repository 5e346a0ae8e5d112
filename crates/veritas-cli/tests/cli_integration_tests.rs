//! Integration tests for the `veritas` binary.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn veritas() -> Command {
    let mut cmd = Command::cargo_bin("veritas").expect("veritas bin");
    cmd.env_remove("VERITAS_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn check_accepts_valid_config() {
    veritas()
        .arg("--config")
        .arg(fixture("echo.yaml"))
        .arg("check")
        .assert()
        .success()
        .stdout(contains("models: 2"))
        .stdout(contains("default: echo"));
}

#[test]
fn check_rejects_invalid_config() {
    veritas()
        .arg("--config")
        .arg(fixture("invalid.yaml"))
        .arg("check")
        .assert()
        .failure()
        .stderr(contains("validating configuration"));
}

#[test]
fn models_json_lists_registrations_in_order() {
    let output = veritas()
        .arg("--config")
        .arg(fixture("echo.yaml"))
        .args(["models", "--json", "--health"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let rows: Value = serde_json::from_slice(&output).expect("json output");
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["model_id"], "echo");
    assert_eq!(rows[0]["default"], true);
    assert_eq!(rows[0]["health"], "ok");
    assert_eq!(rows[1]["capabilities"][0]["tag"], "summarize");
}

#[test]
fn run_prints_accepted_outcome() {
    veritas()
        .arg("--config")
        .arg(fixture("echo.yaml"))
        .args(["run", "--prompt", "summarize the quarterly report"])
        .assert()
        .success()
        .stdout(contains("accepted"))
        .stdout(contains("[local:echo] summarize the quarterly report"));
}

#[test]
fn run_json_routes_by_capability() {
    let output = veritas()
        .arg("--config")
        .arg(fixture("echo.yaml"))
        .args([
            "run",
            "--prompt",
            "summarize the release notes",
            "--capability",
            "summarize",
            "--samples",
            "1",
            "--json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let outcome: Value = serde_json::from_slice(&output).expect("json output");
    assert_eq!(outcome["status"], "accepted");
    assert_eq!(outcome["candidate"]["backend_id"], "echo");
    assert!(outcome["verdict"].is_null());
}

#[test]
fn run_unknown_model_fails() {
    veritas()
        .arg("--config")
        .arg(fixture("echo.yaml"))
        .args(["run", "--prompt", "hello there", "--model", "missing"])
        .assert()
        .failure()
        .stderr(contains("model not found"));
}
