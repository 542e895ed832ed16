//! End-to-end tests driving the `hm` binary over replay scripts.
//!
//! Each test runs with an isolated home and config directory so no user
//! configuration leaks in; the engine is configured through `HM_*` variables.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn hm_binary() -> String {
    env!("CARGO_BIN_EXE_hm").to_string()
}

/// Runs `hm` with a clean environment rooted at `home`.
fn hm(home: &Path, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut command = Command::new(hm_binary());
    command
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("HM_TELEMETRY__ENRICH", "false")
        .args(args);
    for (key, value) in env {
        command.env(key, value);
    }
    command.output().expect("failed to run hm")
}

fn read_records(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

const OPEN_THEN_IDLE: &str = r#"{"at": 0, "event": "document_opening", "path": "C:/models/A.proj"}
{"at": 3, "event": "document_opened", "path": "C:/models/A.proj"}
{"at": 120, "event": "shutdown"}
"#;

/// Opening is timed and an idle user closes the presence session once.
#[test]
fn test_open_then_idle() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("session.jsonl");
    let output = temp.path().join("records.jsonl");
    std::fs::write(&script, OPEN_THEN_IDLE).unwrap();

    let result = hm(
        temp.path(),
        &[
            "replay",
            script.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--start",
            "2025-05-05T09:00:00Z",
        ],
        &[
            ("HM_EVENTS__OPENING", "true"),
            ("HM_EVENTS__TIME_SPENT", "true"),
        ],
    );
    assert!(
        result.status.success(),
        "hm replay should succeed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let records = read_records(&output);
    assert_eq!(records.len(), 2, "records: {records:?}");

    assert_eq!(records[0]["template"], "Opening Document");
    assert_eq!(records[0]["timestamp"], "2025-05-05T09:00:03Z");
    assert_eq!(records[0]["fields"]["ElapsedSeconds"], 3);
    assert_eq!(records[0]["fields"]["DocumentType"], "project");

    assert_eq!(records[1]["template"], "Document Work");
    assert_eq!(records[1]["fields"]["Reason"], "Idle");
    assert_eq!(records[1]["fields"]["Document"], "C:/models/A.proj");
    assert_eq!(records[1]["fields"]["StartTime"], "2025-05-05T09:00:03Z");
    assert_eq!(records[1]["fields"]["EndTime"], "2025-05-05T09:01:10Z");
    assert!(records[1]["fields"]["SessionId"].is_string());
    assert!(records[1]["fields"].get("machineName").is_none());
}

/// A configuration file selects categories; others stay silent.
#[test]
fn test_config_file_limits_categories() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("hm.toml");
    let script = temp.path().join("session.jsonl");
    let output = temp.path().join("records.jsonl");
    std::fs::write(&config, "[events]\nprinting = true\n").unwrap();
    std::fs::write(
        &script,
        r#"{"at": 0, "event": "document_saving", "path": "C:/models/A.proj"}
{"at": 1, "event": "document_saved", "path": "C:/models/A.proj"}
{"at": 2, "event": "document_printed", "path": "C:/models/A.proj", "views": [{"id": 3, "name": "North Elevation"}]}
"#,
    )
    .unwrap();

    let result = hm(
        temp.path(),
        &[
            "--config",
            config.to_str().unwrap(),
            "replay",
            script.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ],
        &[],
    );
    assert!(result.status.success());

    let records = read_records(&output);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["template"], "Printed Document");
    assert_eq!(records[0]["fields"]["View"], "North Elevation");
}

/// An invalid configuration disables every category instead of failing.
#[test]
fn test_invalid_config_records_nothing() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("session.jsonl");
    let output = temp.path().join("records.jsonl");
    std::fs::write(&script, OPEN_THEN_IDLE).unwrap();

    let result = hm(
        temp.path(),
        &[
            "replay",
            script.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ],
        &[
            ("HM_EVENTS__OPENING", "true"),
            ("HM_EVENTS__POLL_INTERVAL_SECONDS", "0"),
        ],
    );
    assert!(result.status.success());
    assert!(read_records(&output).is_empty());
    assert!(
        String::from_utf8_lossy(&result.stderr).contains("all events disabled"),
        "expected a configuration error in the log"
    );
}

/// `hm config` shows environment overrides.
#[test]
fn test_config_command_reflects_environment() {
    let temp = TempDir::new().unwrap();
    let result = hm(
        temp.path(),
        &["config"],
        &[("HM_EVENTS__SAVING", "true"), ("HM_EVENTS__IDLE_TIMEOUT_SECONDS", "300")],
    );
    assert!(result.status.success());

    let config: serde_json::Value = serde_json::from_slice(&result.stdout).unwrap();
    assert_eq!(config["events"]["saving"], true);
    assert_eq!(config["events"]["opening"], false);
    assert_eq!(config["events"]["idle_timeout_seconds"], 300);
    assert_eq!(config["telemetry"]["enrich"], false);
}

/// Malformed scripts fail with the offending line.
#[test]
fn test_malformed_script_fails() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("broken.jsonl");
    std::fs::write(&script, "{\"at\": 0, \"event\": \"input\"}\nnot json\n").unwrap();

    let result = hm(temp.path(), &["replay", script.to_str().unwrap()], &[]);
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("line 2"));
}
