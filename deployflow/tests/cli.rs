//! CLI tests for `deployflow deploy`.
//!
//! Spawns the binary and checks that classified failures map to their exit
//! codes before any network access happens.

use std::process::Command;

use deployflow::exit_codes;
use deployflow::io::config::{API_KEY_ENV, CONFIG_ENV};

fn deployflow(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_deployflow"));
    cmd.env(CONFIG_ENV, config_dir.join("deployflow.toml"))
        .env(API_KEY_ENV, "sk-test")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn unsupported_target_exits_with_its_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = deployflow(temp.path())
        .current_dir(temp.path())
        .args(["deploy", "Deploy it", "--repo", "nowhere/archive.rar"])
        .output()
        .expect("run deployflow");

    assert_eq!(output.status.code(), Some(exit_codes::UNSUPPORTED_TARGET));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: unsupported target"), "{stderr}");
}

#[test]
fn empty_task_exits_successfully() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = deployflow(temp.path())
        .current_dir(temp.path())
        .args(["deploy", "  ", "--repo", "."])
        .output()
        .expect("run deployflow");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("nothing to do"));
}

#[test]
fn missing_evidence_file_is_unclassified_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = deployflow(temp.path())
        .current_dir(temp.path())
        .args([
            "deploy",
            "Deploy it",
            "--repo",
            ".",
            "--evidence-file",
            "missing.json",
            "--workspace",
            "out",
        ])
        .output()
        .expect("run deployflow");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.json"), "{stderr}");
}
