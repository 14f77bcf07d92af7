//! CLI integration tests: exit codes, reporting, JSON summary, rule packs
#![allow(deprecated)] // Command::cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn bin() -> Command {
    Command::cargo_bin("whyismybuildslow").unwrap()
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    serde_json::from_slice(&output.stdout).expect("stdout should be a single JSON object")
}

// ============================================================================
// Usage errors (exit 2)
// ============================================================================

#[test]
fn test_missing_command_is_usage_error() {
    bin()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing command"));
}

#[test]
fn test_missing_separator_is_usage_error() {
    bin().arg("npm").arg("install").assert().code(2);
}

#[test]
fn test_run_word_without_command_is_usage_error() {
    bin().arg("run").assert().code(2);
}

#[test]
fn test_negative_threshold_is_usage_error() {
    bin()
        .arg("--threshold=-1")
        .arg("--")
        .arg("true")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("threshold"));
}

#[test]
fn test_threshold_too_large_for_duration_is_usage_error() {
    bin()
        .args(["--threshold", "1e20", "--", "true"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("threshold"));
}

#[test]
fn test_help_shows_usage() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--threshold"));
}

// ============================================================================
// Spawn errors (exit 1)
// ============================================================================

#[test]
fn test_unknown_executable_is_spawn_error() {
    bin()
        .arg("--no-ui")
        .arg("--")
        .arg("no-such-build-tool-4b1e")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to start 'no-such-build-tool-4b1e'"));
}

#[test]
fn test_spawn_error_in_json_mode_still_emits_summary() {
    let json = json_stdout(bin().arg("--json").arg("--").arg("no-such-build-tool-4b1e"));
    assert_eq!(json["exit_code"], 1);
    assert_eq!(json["cause"], "unknown");
}

// ============================================================================
// Child exit codes
// ============================================================================

#[cfg(unix)]
#[test]
fn test_zero_exit() {
    bin()
        .arg("--no-ui")
        .arg("--")
        .arg("true")
        .assert()
        .code(0)
        .stderr(predicate::str::contains("Exit code: 0"));
}

#[cfg(unix)]
#[test]
fn test_exit_code_passthrough() {
    bin()
        .arg("run")
        .arg("--no-ui")
        .arg("--")
        .args(["sh", "-c", "exit 3"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Exit code: 3"))
        .stderr(predicate::str::contains("failed to start").not());
}

// ============================================================================
// Output passthrough and reports
// ============================================================================

#[cfg(unix)]
#[test]
fn test_child_output_passes_through() {
    bin()
        .arg("--no-ui")
        .arg("--")
        .args(["sh", "-c", "echo hello-out; echo hello-err 1>&2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello-out"))
        .stderr(predicate::str::contains("hello-err"))
        .stderr(predicate::str::contains("Running: sh -c"));
}

#[cfg(unix)]
#[test]
fn test_child_inherits_stdin() {
    bin()
        .args(["--no-ui", "--", "cat"])
        .write_stdin("piped-in\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("piped-in"));
}

#[cfg(unix)]
#[test]
fn test_fast_run_reports_unknown() {
    bin()
        .arg("--no-ui")
        .arg("--")
        .args(["sh", "-c", "echo installing"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No idle gaps longer than 2.0s"))
        .stderr(predicate::str::contains("Likely cause: unknown"));
}

#[cfg(unix)]
#[test]
fn test_text_report_names_the_gap() {
    bin()
        .arg("--no-ui")
        .arg("--threshold")
        .arg("0.2")
        .arg("--")
        .args(["sh", "-c", "echo 'Downloading foo'; sleep 0.5; echo done"])
        .assert()
        .success()
        .stderr(predicate::str::contains("🐌 Network Slug detected"))
        .stderr(predicate::str::contains("Likely cause: network"));
}

// ============================================================================
// JSON summary
// ============================================================================

#[cfg(unix)]
#[test]
fn test_json_summary_is_clean_stdout() {
    // Child stdout is redirected to stderr so stdout stays parseable
    let json = json_stdout(
        bin()
            .arg("--json")
            .arg("--")
            .args(["sh", "-c", "echo not-json; exit 5"]),
    );

    assert_eq!(json["command"], "sh -c echo not-json; exit 5");
    assert_eq!(json["exit_code"], 5);
    assert_eq!(json["cause"], "unknown");
    assert!(json["elapsed_seconds"].as_f64().unwrap() >= 0.0);
    assert!(json["gaps"].as_array().unwrap().is_empty());
}

#[cfg(unix)]
#[test]
fn test_json_summary_reports_gap() {
    let mut cmd = bin();
    cmd.arg("--json")
        .arg("--threshold")
        .arg("0.2")
        .arg("--")
        .args(["sh", "-c", "echo 'docker pull node:20'; sleep 0.5; echo ok"]);
    let json = json_stdout(&mut cmd);

    assert_eq!(json["cause"], "docker");
    let gaps = json["gaps"].as_array().unwrap();
    let sleep_gap = gaps
        .iter()
        .find(|g| g["gap_seconds"].as_f64().unwrap() >= 0.4)
        .expect("sleep gap should be reported");
    assert_eq!(sleep_gap["confidence"], 0.9);
    assert_eq!(sleep_gap["label"], "🚚 Docker Truck");
}

// ============================================================================
// Rule packs
// ============================================================================

#[cfg(unix)]
#[test]
fn test_rule_pack_adds_custom_cause() {
    let tmp_dir = TempDir::new().unwrap();
    let rules = tmp_dir.path().join("causes.toml");
    fs::write(
        &rules,
        r#"
[[rule]]
cause = "rustc"
label = "🦀 Compiler"
explanation = "rustc was busy compiling a large crate"
confidence = 0.7
keywords = ["compiling"]
"#,
    )
    .unwrap();

    let mut cmd = bin();
    cmd.arg("--json")
        .arg("--threshold")
        .arg("0.2")
        .arg("--rules")
        .arg(&rules)
        .arg("--")
        .args(["sh", "-c", "echo 'Compiling serde v1.0'; sleep 0.5; echo ok"]);
    let json = json_stdout(&mut cmd);

    assert_eq!(json["cause"], "rustc");
}

#[test]
fn test_invalid_rule_pack_is_usage_error() {
    let tmp_dir = TempDir::new().unwrap();
    let rules = tmp_dir.path().join("bad.toml");
    fs::write(
        &rules,
        "[[rule]]\ncause = \"x\"\nlabel = \"x\"\nexplanation = \"x\"\nconfidence = 2.0\nkeywords = [\"x\"]\n",
    )
    .unwrap();

    bin()
        .arg("--rules")
        .arg(&rules)
        .arg("--")
        .arg("true")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load cause rules"))
        .stderr(predicate::str::contains("confidence"));
}

#[test]
fn test_missing_rule_pack_is_usage_error() {
    bin()
        .arg("--rules")
        .arg("/nonexistent/causes.toml")
        .arg("--")
        .arg("true")
        .assert()
        .code(2);
}
