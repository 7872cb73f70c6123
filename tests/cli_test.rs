//! Integration tests for the sftp-batch binary
//!
//! These run the real executable. Nothing here needs an SFTP server: they
//! cover argument handling, configuration errors and connect failures.

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

fn sftp_batch_bin() -> String {
    env!("CARGO_BIN_EXE_sftp-batch").to_string()
}

fn run(args: &[&str]) -> Output {
    Command::new(sftp_batch_bin())
        .args(args)
        .env_remove("SFTP_BATCH_HOST")
        .env_remove("SFTP_BATCH_PORT")
        .env_remove("SFTP_BATCH_USER")
        .env_remove("SFTP_BATCH_PASSWORD")
        .output()
        .unwrap()
}

// =============================================================================
// Arguments
// =============================================================================

#[test]
fn test_help_lists_subcommands() {
    let output = run(&["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["upload", "check", "delete"] {
        assert!(stdout.contains(cmd), "help should mention {}", cmd);
    }
}

#[test]
fn test_upload_requires_pairs() {
    let output = run(&["--host", "localhost", "upload"]);
    assert!(!output.status.success());
}

#[test]
fn test_malformed_pair_is_rejected() {
    let output = run(&["--host", "localhost", "upload", "no-separator"]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Expected LOCAL:REMOTE"), "stderr: {}", stderr);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_missing_host_is_a_configuration_error() {
    let output = run(&["check", "some/path"]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("host cannot be blank"), "stderr: {}", stderr);
}

#[test]
fn test_profile_with_unknown_field_is_rejected() {
    let dir = TempDir::new().unwrap();
    let profile = dir.path().join("profile.toml");
    fs::write(&profile, "host = \"localhost\"\nhostname = \"typo\"\n").unwrap();

    let output = run(&["--profile", profile.to_str().unwrap(), "check", "x"]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load profile"), "stderr: {}", stderr);
}

// =============================================================================
// Connect failures
// =============================================================================

#[test]
fn test_unreachable_server_fails_check() {
    // Nothing listens on port 1; the connect is refused and the task fails
    let output = run(&["--quiet", "--host", "127.0.0.1", "--port", "1", "check", "x"]);
    assert_eq!(output.status.code(), Some(1));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FAILED"), "stdout: {}", stdout);
}
