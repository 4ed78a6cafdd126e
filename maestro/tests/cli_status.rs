//! CLI tests for `maestro init`, `maestro status`, `maestro parse` and the
//! `maestro run` cycle limit.
//!
//! Spawns the maestro binary and checks exit codes and printed output.

use std::fs;
use std::process::{Command, Stdio};

use maestro::exit_codes;
use maestro::io::config::{InferenceConfig, MaestroConfig, write_config};
use maestro::io::init::{InitOptions, MaestroPaths, init_maestro};
use maestro::io::snapshot_store::load_snapshot;

fn maestro() -> Command {
    Command::new(env!("CARGO_BIN_EXE_maestro"))
}

#[test]
fn init_then_status_reports_awaiting_goal() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = maestro()
        .arg("--root")
        .arg(temp.path())
        .arg("init")
        .status()
        .expect("maestro init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert!(temp.path().join(".maestro/config.toml").is_file());
    assert!(temp.path().join("workspace").is_dir());

    let output = maestro()
        .arg("--root")
        .arg(temp.path())
        .arg("status")
        .output()
        .expect("maestro status");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("phase: AWAITING_GOAL"), "{stdout}");
    assert!(stdout.contains("status: Not Started"), "{stdout}");
}

#[test]
fn second_init_without_force_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_maestro(temp.path(), &InitOptions { force: false }).expect("init");

    let status = maestro()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("maestro init");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = maestro()
        .current_dir(temp.path())
        .args(["init", "--force"])
        .status()
        .expect("maestro init --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn status_without_init_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = maestro()
        .current_dir(temp.path())
        .arg("status")
        .output()
        .expect("maestro status");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not initialized"));
}

#[test]
fn parse_prints_actions_as_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let directive = temp.path().join("directive.txt");
    fs::write(
        &directive,
        "ACTION: CREATE_FILE path=\"src/lib.rs\"\n```rust\npub fn f() {}\n```\nTASK_COMPLETE: write lib\n",
    )
    .expect("write directive");

    let output = maestro()
        .arg("parse")
        .arg(&directive)
        .args(["--task", "write lib"])
        .output()
        .expect("maestro parse");
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("parse output is json");
    assert_eq!(json["fileActions"][0]["kind"], "CREATE_FILE");
    assert_eq!(json["fileActions"][0]["path"], "src/lib.rs");
    assert_eq!(json["fileActions"][0]["content"], "pub fn f() {}\n");
    assert_eq!(json["taskStatus"]["status"], "complete");
    assert!(json["systemAction"].is_null());
}

#[cfg(unix)]
#[test]
fn run_stops_at_cycle_limit() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_maestro(temp.path(), &InitOptions { force: false }).expect("init");
    write_config(
        &paths.config_path,
        &MaestroConfig {
            inference: InferenceConfig {
                command: vec!["true".to_string()],
                ..InferenceConfig::default()
            },
            ..MaestroConfig::default()
        },
    )
    .expect("write config");

    let output = maestro()
        .current_dir(temp.path())
        .args(["run", "--goal", "Write a haiku", "--max-cycles", "2"])
        .stdin(Stdio::null())
        .output()
        .expect("maestro run");
    assert_eq!(output.status.code(), Some(exit_codes::CYCLE_LIMIT));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cycle 2:"), "{stdout}");

    let snapshot = load_snapshot(&MaestroPaths::new(temp.path()))
        .expect("load snapshot")
        .snapshot;
    assert_eq!(snapshot.project.goal, "Write a haiku");
    assert_eq!(snapshot.phase.as_str(), "Planning");
}
