//! CLI integration tests for stagelock
//!
//! Drives the `stagelock` binary end-to-end using assert_cmd, feeding
//! interactions on stdin.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command isolated from the user's configuration and tokens
#[allow(deprecated)]
fn stagelock_cmd(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("stagelock").unwrap();
    cmd.env("STAGELOCK_CONFIG_DIR", config_dir.path());
    cmd.env_remove("STAGELOCK_SLACK_TOKEN");
    cmd.env_remove("SLACK_BOT_TOKEN");
    cmd.env("RUST_LOG", "stagelock=warn");
    cmd.current_dir(config_dir.path());
    cmd
}

fn summary_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("summary is valid JSON")
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    stagelock_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_serve_console_prints_status_and_notices() {
    let dir = TempDir::new().unwrap();
    stagelock_cmd(&dir)
        .arg("serve")
        .write_stdin("take U1\ngetOnQueue U2\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("[staging] Free to take!"))
        .stdout(predicate::str::contains("[staging] notice: <@U1> took staging."))
        .stdout(predicate::str::contains(
            "[staging] notice: <@U2> added to queue.",
        ))
        .stdout(predicate::str::contains("[staging] Queue: <@U2>"))
        .stdout(predicate::str::contains("Processed 2 interactions (0 rejected)"));
}

#[test]
fn test_serve_json_summary() {
    let dir = TempDir::new().unwrap();
    let input = concat!(
        "take A\n",
        "getOnQueue B\n",
        "getOnQueue C\n",
        "queueNext C\n",
        "release A\n",
    );

    let output = stagelock_cmd(&dir)
        .args(["serve", "--gateway", "recording", "--format", "json"])
        .write_stdin(input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary = summary_json(&output.stdout);
    assert_eq!(summary["interactions"], 5);
    assert_eq!(summary["rejected"], 0);
    assert_eq!(summary["delivery"]["failed"], 0);

    let staging = &summary["resources"][0];
    assert_eq!(staging["resource"], "staging");
    assert_eq!(staging["state"], "taken");
    assert_eq!(staging["holder"], "C");
    assert_eq!(staging["queue"], serde_json::json!(["B"]));
}

#[test]
fn test_serve_accepts_slack_callbacks() {
    let dir = TempDir::new().unwrap();
    let input = concat!(
        r#"{"type":"interactive_message","callback_id":"qa","user":{"id":"U9"},"actions":[{"name":"take"}]}"#,
        "\n",
        r#"{"type":"interactive_message","callback_id":"qa","user":{"id":"U8"},"actions":[{"name":"override"}]}"#,
        "\n",
    );

    let output = stagelock_cmd(&dir)
        .args([
            "serve", "-r", "staging", "-r", "qa", "-g", "recording", "--format", "json",
        ])
        .write_stdin(input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary = summary_json(&output.stdout);
    let resources = summary["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 2);

    let qa = resources.iter().find(|r| r["resource"] == "qa").unwrap();
    assert_eq!(qa["holder"], "U8");
    let staging = resources.iter().find(|r| r["resource"] == "staging").unwrap();
    assert_eq!(staging["state"], "free");
}

#[test]
fn test_serve_counts_rejected_interactions() {
    let dir = TempDir::new().unwrap();
    let input = concat!(
        "dance U1\n",
        "take U1 prod\n",
        "# comments and blank lines are skipped\n",
        "\n",
        r#"{"type":"view_submission","user":{"id":"U1"},"actions":[{"name":"take"}]}"#,
        "\n",
        "take U1\n",
    );

    let output = stagelock_cmd(&dir)
        .args(["serve", "--gateway", "recording", "--format", "json"])
        .write_stdin(input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary = summary_json(&output.stdout);
    assert_eq!(summary["interactions"], 4);
    assert_eq!(summary["rejected"], 3);
    assert_eq!(summary["resources"][0]["holder"], "U1");
}

#[test]
fn test_serve_slack_without_token_fails() {
    let dir = TempDir::new().unwrap();
    stagelock_cmd(&dir)
        .args(["serve", "--gateway", "slack"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("gateway.channel"));
}

#[test]
fn test_config_set_get_round_trip() {
    let dir = TempDir::new().unwrap();

    stagelock_cmd(&dir)
        .args(["config", "set", "arbiter.reminder_delay_secs", "90"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set arbiter.reminder_delay_secs = 90"));

    stagelock_cmd(&dir)
        .args(["config", "get", "arbiter.reminder_delay_secs"])
        .assert()
        .success()
        .stdout(predicate::str::diff("90\n"));

    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn test_config_rejects_stored_token() {
    let dir = TempDir::new().unwrap();
    stagelock_cmd(&dir)
        .args(["config", "set", "gateway.bot_token", "xoxb-secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("environment variable"));

    assert!(!dir.path().join("config.toml").exists());
}

#[test]
fn test_config_list_and_reset() {
    let dir = TempDir::new().unwrap();

    stagelock_cmd(&dir)
        .args(["config", "set", "gateway.kind", "recording"])
        .assert()
        .success();

    stagelock_cmd(&dir)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gateway.kind = recording"))
        .stdout(predicate::str::contains("arbiter.default_resource = staging"));

    stagelock_cmd(&dir)
        .args(["config", "reset"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration reset to defaults."));

    stagelock_cmd(&dir)
        .args(["config", "get", "gateway.kind"])
        .assert()
        .success()
        .stdout(predicate::str::diff("console\n"));
}

#[test]
fn test_config_path_uses_override_dir() {
    let dir = TempDir::new().unwrap();
    stagelock_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(
            dir.path().to_string_lossy().to_string(),
        ));
}

#[test]
fn test_config_unknown_key() {
    let dir = TempDir::new().unwrap();
    stagelock_cmd(&dir)
        .args(["config", "get", "llm.model"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}
