//! Integration tests for the edgeos-bouncer binary.
//!
//! None of these reach a real router or feed: they cover argument handling
//! and the configuration errors reported before any network access.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

/// Run edgeos-bouncer with a clean credential environment
fn run_bouncer(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_edgeos-bouncer"))
        .args(args)
        .env_remove("CS_TOKEN")
        .env_remove("CS_URL")
        .env_remove("ER_USER")
        .env_remove("ER_PASS")
        .env_remove("ER_URL")
        .env_remove("ER_GROUP")
        .output()
        .expect("Failed to execute edgeos-bouncer")
}

fn write_config(dir: &Path, content: &str) -> String {
    let path = dir.join("config.yaml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_version_command() {
    let output = run_bouncer(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("edgeos-bouncer"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_command() {
    let output = run_bouncer(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("sync"));
    assert!(stdout.contains("show"));
}

#[test]
fn test_unknown_command_fails() {
    let output = run_bouncer(&["purge"]);
    assert!(!output.status.success());
}

#[test]
fn test_run_without_credentials_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    let output = run_bouncer(&["run", "--config", missing.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("CS_URL") || stderr.contains("CS_TOKEN"),
        "Expected a missing setting error, got: {}",
        stderr
    );
}

#[test]
fn test_run_rejects_malformed_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "feed: [unclosed\n");
    let output = run_bouncer(&["run", "--config", &config]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parse"), "Unexpected stderr: {}", stderr);
}

#[test]
fn test_sync_rejects_invalid_interval() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
feed:
  url: http://127.0.0.1:8080
  api_key: key
device:
  url: https://192.168.1.1
  user: ubnt
  password: ubnt
  group: crowdsec
engine:
  tick_interval: soon
"#,
    );
    let output = run_bouncer(&["sync", "--config", &config]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("engine.tick_interval"),
        "Unexpected stderr: {}",
        stderr
    );
}

#[test]
fn test_show_requires_group() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "device:\n  url: https://192.168.1.1\n");
    let output = run_bouncer(&["show", "--config", &config]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ER_GROUP"), "Unexpected stderr: {}", stderr);
}
