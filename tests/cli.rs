//! Integration tests for the poolman CLI.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

/// Get a command for the poolman binary.
fn poolman() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("poolman").unwrap();
    cmd.env_remove("POOLMAN_WORKERS")
        .env_remove("POOLMAN_QUEUE_SIZE")
        .env_remove("POOLMAN_ORDERED");
    cmd
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays() {
    poolman()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("targets"));
}

#[test]
fn test_version_displays() {
    poolman()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("poolman"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_worker_flag_is_not_a_subcommand() {
    // Without a pool on the other end the worker sees EOF and exits cleanly
    poolman()
        .arg("--internal-worker")
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ============================================================================
// Targets Command Tests
// ============================================================================

#[test]
fn test_targets_lists_builtins() {
    poolman()
        .arg("targets")
        .assert()
        .success()
        .stdout(predicate::str::contains("square"))
        .stdout(predicate::str::contains("counter"))
        .stdout(predicate::str::contains("process"));
}

// ============================================================================
// Run Command Tests
// ============================================================================

#[test]
fn test_run_square_ordered() {
    poolman()
        .args(["run", "--target", "square", "--workers", "2", "--ordered", "1", "2", "3", "4"])
        .assert()
        .success()
        .stdout("1\n4\n9\n16\n");
}

#[test]
fn test_run_with_static_arg() {
    poolman()
        .args([
            "run",
            "--target",
            "scale",
            "--workers",
            "1",
            "--static-arg",
            "3",
            "5",
        ])
        .assert()
        .success()
        .stdout("15\n");
}

#[test]
fn test_run_feed_mode() {
    poolman()
        .args(["run", "--target", "square", "--workers", "2", "--ordered", "--feed", "5", "6"])
        .assert()
        .success()
        .stdout("25\n36\n");
}

#[test]
fn test_run_failure_sets_exit_code() {
    poolman()
        .args(["run", "--target", "invert", "--workers", "1", "--ordered", "2", "0"])
        .assert()
        .code(1)
        .stdout("0.5\n")
        .stderr(predicate::str::contains("task 1: division by zero"));
}

#[test]
fn test_run_reads_input_file() {
    let mut input = NamedTempFile::new().unwrap();
    writeln!(input, "2").unwrap();
    writeln!(input).unwrap();
    writeln!(input, "7").unwrap();

    poolman()
        .args(["run", "--target", "square", "--workers", "1", "--ordered", "--input"])
        .arg(input.path())
        .assert()
        .success()
        .stdout("4\n49\n");
}

#[test]
fn test_run_forwards_worker_logs() {
    poolman()
        .args([
            "run",
            "--target",
            "echo_log",
            "--workers",
            "1",
            "--forward-logs",
            "demo",
            "--forward-level",
            "info",
            "ping",
        ])
        .assert()
        .success()
        .stdout("\"ping\"\n")
        .stderr(predicate::str::contains("demo::task"))
        .stderr(predicate::str::contains("ping"))
        .stderr(predicate::str::contains("not forwarded").not());
}

#[test]
fn test_run_unknown_target() {
    poolman()
        .args(["run", "--target", "nope", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown target 'nope'"));
}

#[test]
fn test_run_rejects_zero_workers() {
    poolman()
        .args(["run", "--target", "square", "--workers", "0", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid pool configuration"));
}
