//! Binary-level tests for `dde-bridge`: stdout JSON shape and exit codes.
//!
//! None of these need a live DDE server. Off Windows every server creation
//! fails, and on Windows the endpoints used here have no server behind them.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

/// `dde-bridge` with the bridge environment cleared and a short probe budget.
fn bridge_cmd() -> assert_cmd::Command {
    let scratch = std::env::temp_dir().join("dde-bridge-cli-test");
    let mut cmd = cargo_bin_cmd!("dde-bridge");
    cmd.env("XDG_DATA_HOME", &scratch)
        .env("LOCALAPPDATA", &scratch)
        .env_remove("RUST_LOG")
        .env_remove("DDE_BRIDGE_SENTRY_DSN")
        .env_remove("RSLINX_APPLICATION")
        .env_remove("RSLINX_TOPIC")
        .env_remove("DDE_MAX_RETRIES")
        .env_remove("DDE_RETRY_DELAY_MS")
        .env_remove("DDE_PROBE_TIMEOUT_MS")
        .env_remove("DDE_PROBE_INTERVAL_MS")
        .env_remove("DDE_TRANSACTION_TIMEOUT_MS")
        .env_remove("DDE_VALIDATION_ITEM")
        .args(["--probe-timeout-ms", "200", "--probe-interval-ms", "50"])
        .args(["--max-retries", "1"]);
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1, "expected one JSON line:\n{stdout}");
    serde_json::from_str(&stdout).unwrap()
}

// ── Well-formed requests exit 0 ─────────────────────────────────────

#[test]
fn check_against_unreachable_endpoint_exits_zero() {
    let output = bridge_cmd()
        .arg(r#"{"action":"check","application":"X","topic":"Y"}"#)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let json = stdout_json(&output);
    assert_eq!(json["available"], false);
    assert!(!json["message"].as_str().unwrap().is_empty());
}

#[test]
fn read_from_unreachable_endpoint_reports_error_in_payload() {
    let output = bridge_cmd()
        .arg(r#"{"action":"read","application":"X","topic":"Y","item":"Tag"}"#)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let json = stdout_json(&output);
    assert_eq!(json["value"], serde_json::Value::Null);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("DDE Server not available: "));
}

#[test]
fn unknown_action_exits_zero_with_error() {
    bridge_cmd()
        .arg(r#"{"action":"subscribe"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"error":"Unknown action: subscribe"}"#));
}

// ── Argument failures exit 1 with an error object ───────────────────

#[test]
fn read_without_item_fails() {
    let output = bridge_cmd().arg(r#"{"action":"read"}"#).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stdout_json(&output),
        serde_json::json!({"error": "Missing required field: item"})
    );
}

#[test]
fn malformed_json_fails() {
    bridge_cmd()
        .arg("{action: read")
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with(r#"{"error":"Invalid request JSON: "#));
}

#[test]
fn missing_argument_fails_with_json() {
    let output = cargo_bin_cmd!("dde-bridge").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout_json(&output)["error"]
        .as_str()
        .unwrap()
        .starts_with("Expected exactly one JSON argument: "));
}

#[test]
fn extra_argument_fails_with_json() {
    bridge_cmd()
        .args([r#"{"action":"check"}"#, "extra"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""error""#));
}

#[test]
fn invalid_environment_fails_with_json() {
    bridge_cmd()
        .env("DDE_RETRY_DELAY_MS", "soon")
        .arg(r#"{"action":"check"}"#)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("DDE_RETRY_DELAY_MS"));
}

// ── Informational flags ─────────────────────────────────────────────

#[test]
fn help_flag() {
    cargo_bin_cmd!("dde-bridge")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--max-retries"));
}

#[test]
fn version_flag() {
    cargo_bin_cmd!("dde-bridge")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dde-bridge"));
}
