//! CLI integration tests

use std::process::{Command, Output};

fn gridctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gridctl"))
        .args(args)
        .env_remove("GRIDCTL_AGENT_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = gridctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("compute grid"), "Should show app description");
    for command in ["load", "stress", "run", "containers", "reclaim", "health"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = gridctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("gridctl"), "Should show binary name");
}

/// Test global options
#[test]
fn test_global_options() {
    let output = gridctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
    assert!(stdout.contains("--agent-url"), "Should show agent-url option");
    assert!(stdout.contains("GRIDCTL_AGENT_URL"), "Should show env var");
}

/// Test stress command help
#[test]
fn test_stress_help() {
    let output = gridctl(&["stress", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Stress help should succeed");
    assert!(stdout.contains("--percent"), "Should show percent option");
    assert!(stdout.contains("--duration"), "Should show duration option");
}

/// Test run command help
#[test]
fn test_run_help() {
    let output = gridctl(&["run", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Run help should succeed");
    assert!(stdout.contains("--env"), "Should show env option");
    assert!(stdout.contains("--wait"), "Should show wait option");
    assert!(stdout.contains("<IMAGE>"), "Should show image argument");
}

/// Out-of-range load is rejected before any request is made
#[test]
fn test_stress_rejects_percent_above_100() {
    let output = gridctl(&["stress", "--percent", "150", "--duration", "10"]);

    assert!(!output.status.success(), "Percent above 100 should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("150"), "Should name the rejected value");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = gridctl(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let output = gridctl(&["run"]);

    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}

/// An unreachable agent is reported as an error, not a panic
#[test]
fn test_unreachable_agent_fails_cleanly() {
    let output = gridctl(&["--agent-url", "http://127.0.0.1:9", "--timeout", "2", "load"]);

    assert!(!output.status.success(), "Unreachable agent should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to send request"));
}
