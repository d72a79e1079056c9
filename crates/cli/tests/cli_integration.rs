//! CLI integration tests for the `bobbin` subcommands.
//!
//! Uses `assert_cmd` to spawn the binary and verify exit codes, stdout and
//! stderr. Every test runs from the workspace root so `fixtures/` paths
//! resolve.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

fn bobbin() -> Command {
    let mut cmd = cargo_bin_cmd!("bobbin");
    cmd.current_dir(workspace_root());
    cmd.env_remove("BOBBIN_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_lists_subcommands() {
    bobbin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("access"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn version_exits_0() {
    bobbin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bobbin"));
}

// ──────────────────────────────────────────────
// 2. check
// ──────────────────────────────────────────────

#[test]
fn check_json_fixture_is_valid() {
    bobbin()
        .args(["check", "fixtures/basic_order.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid: basic_order"))
        .stdout(predicate::str::contains("5 states"));
}

#[test]
fn check_toml_fixture_is_valid() {
    bobbin()
        .args(["check", "fixtures/basic_order.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid: basic_order"));
}

#[test]
fn check_json_output_reports_counts() {
    let output = bobbin()
        .args(["--output", "json", "check", "fixtures/basic_order.json"])
        .output()
        .expect("run bobbin");
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["valid"], true);
    assert_eq!(json["code"], "basic_order");
    assert_eq!(json["states"], 5);
    assert_eq!(json["transitions"], 8);
    assert_eq!(json["warnings"].as_array().map(Vec::len), Some(0));
}

#[test]
fn check_rejects_two_start_states() {
    bobbin()
        .args(["check", "fixtures/broken_two_starts.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("exactly one start state"));
}

#[test]
fn check_missing_file_fails() {
    bobbin()
        .args(["check", "fixtures/does_not_exist.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("does_not_exist.json"));
}

#[test]
fn check_reports_warnings_for_unreachable_state() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("orphan.json");
    fs::write(
        &path,
        r#"{
            "name": "Orphan",
            "code": "orphan",
            "states": [
                {"code": "open", "name": "Open", "type": "start"},
                {"code": "closed", "name": "Closed", "type": "end"},
                {"code": "lost", "name": "Lost", "type": "end"}
            ],
            "transitions": [
                {"from_state": "open", "to_state": "closed", "event": "close"}
            ]
        }"#,
    )
    .expect("write definition");

    bobbin()
        .arg("check")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("warning: state 'lost' is unreachable"));
}

#[test]
fn check_quiet_prints_nothing_on_success() {
    bobbin()
        .args(["--quiet", "check", "fixtures/basic_order.json"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 3. simulate
// ──────────────────────────────────────────────

#[test]
fn simulate_happy_path_reaches_completed() {
    bobbin()
        .args([
            "simulate",
            "fixtures/basic_order.json",
            "--event",
            "submit_order",
            "--event",
            "start_production",
            "--event",
            "complete",
            "--entity",
            "fixtures/order_entity.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("start: Draft"))
        .stdout(predicate::str::contains("1. submit_order: Draft -> Ordered"))
        .stdout(predicate::str::contains("final: Completed (terminal)"));
}

#[test]
fn simulate_condition_not_met_without_progress() {
    bobbin()
        .args([
            "simulate",
            "fixtures/basic_order.json",
            "--event",
            "submit_order",
            "--event",
            "start_production",
            "--event",
            "complete",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("step 3 (complete) failed"))
        .stderr(predicate::str::contains("condition not met"));
}

#[test]
fn simulate_cancel_requires_admin() {
    bobbin()
        .args([
            "simulate",
            "fixtures/basic_order.json",
            "--event",
            "cancel",
            "--roles",
            "sales",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lacks role 'admin'"));

    bobbin()
        .args([
            "simulate",
            "fixtures/basic_order.json",
            "--event",
            "cancel",
            "--roles",
            "sales,admin",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("final: Cancelled (terminal)"));
}

#[test]
fn simulate_json_failure_carries_kind_and_step() {
    let output = bobbin()
        .env("BOBBIN_LOG", "off")
        .args([
            "--output",
            "json",
            "simulate",
            "fixtures/basic_order.json",
            "--event",
            "submit_order",
            "--event",
            "submit_order",
        ])
        .output()
        .expect("run bobbin");
    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value =
        serde_json::from_slice(&output.stderr).expect("stderr should be JSON");
    assert_eq!(json["kind"], "no_matching_transition");
    assert_eq!(json["step"], 2);
    assert_eq!(json["state"], 1);
    assert_eq!(json["history"].as_array().map(Vec::len), Some(1));
}

#[test]
fn simulate_json_success_reports_final_state() {
    let output = bobbin()
        .args([
            "--output",
            "json",
            "simulate",
            "fixtures/basic_order.toml",
            "--event",
            "submit_order",
            "--event",
            "start_cutting",
            "--event",
            "update_progress",
        ])
        .output()
        .expect("run bobbin");
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["final_state"], 2);
    assert_eq!(json["final_state_name"], "In production");
    assert_eq!(json["terminal"], false);
    assert_eq!(json["history"].as_array().map(Vec::len), Some(3));
}

#[test]
fn simulate_requires_an_event() {
    bobbin()
        .args(["simulate", "fixtures/basic_order.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--event"));
}

// ──────────────────────────────────────────────
// 4. access
// ──────────────────────────────────────────────

#[test]
fn access_resource_allowed_and_denied() {
    bobbin()
        .args([
            "access",
            "--session",
            "fixtures/session_sales.json",
            "--resource",
            "order:create",
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff("allowed\n"));

    bobbin()
        .args([
            "access",
            "--session",
            "fixtures/session_sales.json",
            "--resource",
            "order:delete",
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff("denied\n"));
}

#[test]
fn access_malformed_resource_is_denied() {
    bobbin()
        .args([
            "access",
            "--session",
            "fixtures/session_sales.json",
            "--resource",
            "badtoken",
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff("denied\n"));
}

#[test]
fn access_menu_action_and_role() {
    bobbin()
        .args([
            "access",
            "--session",
            "fixtures/session_sales.json",
            "--menu",
            "style",
            "--action",
            "view",
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff("allowed\n"));

    bobbin()
        .args([
            "--output",
            "json",
            "access",
            "--session",
            "fixtures/session_sales.json",
            "--role",
            "admin",
            "--role",
            "sales",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"allowed\":true"));
}

#[test]
fn access_legacy_session_falls_back_to_menus() {
    bobbin()
        .args([
            "access",
            "--session",
            "fixtures/session_legacy.json",
            "--menu",
            "order",
            "--action",
            "anything",
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff("allowed\n"));
}

#[test]
fn access_requires_a_query() {
    bobbin()
        .args(["access", "--session", "fixtures/session_sales.json"])
        .assert()
        .failure();
}

#[test]
fn access_menu_without_action_is_rejected() {
    bobbin()
        .args([
            "access",
            "--session",
            "fixtures/session_sales.json",
            "--menu",
            "order",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--action"));
}
