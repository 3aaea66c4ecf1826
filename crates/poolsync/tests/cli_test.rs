//! Integration tests for the `poolsync` CLI binary.
//!
//! Every test runs against temporary fixtures with the user's real
//! configuration and `POOLSYNC_*` environment masked out.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `poolsync` binary with env isolation.
fn poolsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("poolsync");
    cmd.env("HOME", "/tmp/poolsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/poolsync-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("POOLSYNC_CONFIG")
        .env_remove("POOLSYNC_DEFAULTS__OUTPUT")
        .env_remove("POOLSYNC_REQUEST__DEBOUNCE_MS")
        .env_remove("POOLSYNC_PAGER__PAGE_SIZE")
        .env_remove("POOLSYNC_WINDOW__STEP");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

/// 27 VMs, ids 1..=27.
fn vm_pool(dir: &Path) -> PathBuf {
    let items: Vec<Value> = (1..=27)
        .map(|id| {
            json!({
                "id": id,
                "name": format!("vm-{id}"),
                "state": if id % 2 == 0 { "poweroff" } else { "running" },
                "host": if id <= 10 { "h1" } else { "h2" },
            })
        })
        .collect();
    write_json(dir, "pool.json", &json!({ "kind": "vm", "items": items }))
}

fn replay_json(args: &[&str]) -> Value {
    let output = poolsync_cmd().args(args).output().unwrap();
    assert!(
        output.status.success(),
        "replay failed:\n{}",
        combined_output(&output)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn item_ids(report: &Value) -> Vec<u64> {
    report["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_u64().unwrap())
        .collect()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = poolsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    poolsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("replay").and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    poolsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("poolsync"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    poolsync_cmd()
        .args(["config", "path", "--config", "/tmp/elsewhere/poolsync.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/elsewhere/poolsync.toml"));
}

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let path_str = path.to_str().unwrap();

    poolsync_cmd()
        .args(["config", "init", "--config", path_str])
        .assert()
        .success();
    assert!(path.exists());

    poolsync_cmd()
        .args(["config", "init", "--config", path_str])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("already exists"));

    let output = poolsync_cmd()
        .args(["config", "show", "-o", "json", "--config", path_str])
        .output()
        .unwrap();
    assert!(output.status.success());
    let shown: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["config"]["pager"]["page_size"], 20);
    assert_eq!(shown["tuning"]["debounce_ms"], 100);
    assert_eq!(shown["tuning"]["window_step"], 20);
}

#[test]
fn test_config_show_table_is_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[window]\nstep = 5\n").unwrap();

    poolsync_cmd()
        .args(["config", "show", "--config", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[window]")
                .and(predicate::str::contains("step = 5"))
                .and(predicate::str::contains("window_step = 5")),
        );
}

#[test]
fn test_invalid_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[pager]\npage_size = 0\n").unwrap();

    poolsync_cmd()
        .args(["config", "show", "--config", path.to_str().unwrap()])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("page_size"));
}

#[test]
fn test_env_overrides_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[pager]\npage_size = 50\n").unwrap();

    let output = poolsync_cmd()
        .env("POOLSYNC_PAGER__PAGE_SIZE", "15")
        .args(["config", "show", "-o", "json", "--config", path.to_str().unwrap()])
        .output()
        .unwrap();
    let shown: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["tuning"]["page_size"], 15);
}

// ── Replay ──────────────────────────────────────────────────────────

#[test]
fn test_replay_pages_pool_to_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let pool = vm_pool(dir.path());
    let config = dir.path().join("config.toml");

    let report = replay_json(&[
        "replay",
        "-o",
        "json",
        "--config",
        config.to_str().unwrap(),
        "--pool",
        pool.to_str().unwrap(),
    ]);

    let summary = &report["summary"];
    assert_eq!(summary["kind"], "vm");
    assert_eq!(summary["page_size"], 20);
    assert_eq!(summary["pages"], 2);
    assert_eq!(summary["scroll_triggers"], 1);
    assert_eq!(summary["exhausted"], true);
    assert_eq!(summary["items"], 27);
    assert_eq!(summary["window_steps"], 1);
    assert_eq!(item_ids(&report), (1..=27).collect::<Vec<u64>>());
}

#[test]
fn test_replay_reconciles_push_events() {
    let dir = tempfile::tempdir().unwrap();
    let pool = vm_pool(dir.path());
    let config = dir.path().join("config.toml");
    let update = json!({
        "kind": "vm",
        "resource_id": 3,
        "operation": "update",
        "payload": { "id": 3, "name": "vm-3", "state": "poweroff" },
    });
    let events = write_json(
        dir.path(),
        "events.json",
        &json!([
            update,
            { "kind": "vm", "resource_id": 5, "operation": "delete" },
            {
                "kind": "vm",
                "resource_id": 100,
                "operation": "create",
                "payload": { "id": 100, "name": "vm-100", "state": "pending" },
            },
            update,
            {
                "kind": "host",
                "resource_id": 1,
                "operation": "delete",
            },
        ]),
    );

    let report = replay_json(&[
        "replay",
        "-o",
        "json",
        "--config",
        config.to_str().unwrap(),
        "--pool",
        pool.to_str().unwrap(),
        "--events",
        events.to_str().unwrap(),
        "--page-size",
        "10",
    ]);

    let summary = &report["summary"];
    assert_eq!(summary["pages"], 3);
    assert_eq!(summary["scroll_triggers"], 2);
    assert_eq!(summary["push"]["delivered"], 4);
    assert_eq!(summary["push"]["applied"], 3);
    assert_eq!(summary["push"]["duplicates"], 1);
    assert_eq!(summary["items"], 27);

    let ids = item_ids(&report);
    assert!(!ids.contains(&5));
    assert_eq!(ids.last(), Some(&100));
    let vm3 = report["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["id"] == 3)
        .unwrap();
    assert_eq!(vm3["state"], "poweroff");
}

#[test]
fn test_replay_applies_filters() {
    let dir = tempfile::tempdir().unwrap();
    let pool = vm_pool(dir.path());
    let config = dir.path().join("config.toml");

    let report = replay_json(&[
        "replay",
        "-o",
        "json",
        "--config",
        config.to_str().unwrap(),
        "--pool",
        pool.to_str().unwrap(),
        "--filter",
        "state=running",
        "--filter",
        "host=h1",
    ]);

    assert_eq!(item_ids(&report), vec![1, 3, 5, 7, 9]);
    assert_eq!(report["summary"]["pages"], 1);
}

#[test]
fn test_replay_table_output() {
    let dir = tempfile::tempdir().unwrap();
    let pool = vm_pool(dir.path());
    let config = dir.path().join("config.toml");

    poolsync_cmd()
        .args([
            "replay",
            "--config",
            config.to_str().unwrap(),
            "--pool",
            pool.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("vm-27").and(predicate::str::contains("State")))
        .stderr(predicate::str::contains("27 vm items in 2 pages"));
}

#[test]
fn test_replay_quiet_prints_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let pool = vm_pool(dir.path());
    let config = dir.path().join("config.toml");

    poolsync_cmd()
        .args([
            "replay",
            "-q",
            "--config",
            config.to_str().unwrap(),
            "--pool",
            pool.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ── Failures ────────────────────────────────────────────────────────

#[test]
fn test_missing_pool_fixture_exits_with_fixture_code() {
    poolsync_cmd()
        .args(["replay", "--pool", "/tmp/poolsync-cli-test-nonexistent/pool.json"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Could not read fixture"));
}

#[test]
fn test_malformed_event_log_exits_with_fixture_code() {
    let dir = tempfile::tempdir().unwrap();
    let pool = vm_pool(dir.path());
    let events = dir.path().join("events.json");
    std::fs::write(&events, r#"[{"kind": "vm", "operation": "explode"}]"#).unwrap();

    poolsync_cmd()
        .args([
            "replay",
            "--pool",
            pool.to_str().unwrap(),
            "--events",
            events.to_str().unwrap(),
        ])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("is not valid"));
}

#[test]
fn test_bad_filter_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let pool = vm_pool(dir.path());

    poolsync_cmd()
        .args(["replay", "--pool", pool.to_str().unwrap(), "--filter", "running"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_zero_page_size_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let pool = vm_pool(dir.path());

    poolsync_cmd()
        .args(["replay", "--pool", pool.to_str().unwrap(), "--page-size", "0"])
        .assert()
        .code(2);
}
