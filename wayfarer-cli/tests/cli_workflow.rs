//! Integration tests for the `wayfarer` binary.
//!
//! Each test points `--config` at a temporary file so the user's
//! ~/.wayfarer directory is never touched.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn wayfarer(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wayfarer"))
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run wayfarer binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Config that keeps logs and saved sessions inside `dir`.
fn write_sandbox_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.ini");
    let content = format!(
        "[navigation]\nstate_dir = {}\n\n[logging]\ndirectory = {}\n",
        dir.join("state").display(),
        dir.join("logs").display()
    );
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// config
// ============================================================================

#[test]
fn test_config_init_writes_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.ini");

    let output = wayfarer(&path, &["config", "init"]);

    assert!(output.status.success());
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("[coordinator]"));
    assert!(content.contains("max_timers = 15"));
    assert!(content.contains("[navigation]"));
}

#[test]
fn test_config_init_keeps_existing_file_without_force() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.ini");
    fs::write(&path, "[coordinator]\nmax_timers = 4\n").unwrap();

    let output = wayfarer(&path, &["config", "init"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("already exists"));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "[coordinator]\nmax_timers = 4\n"
    );

    let output = wayfarer(&path, &["config", "init", "--force"]);
    assert!(output.status.success());
    assert!(fs::read_to_string(&path).unwrap().contains("max_timers = 15"));
}

#[test]
fn test_config_show_reflects_file_values() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.ini");
    fs::write(&path, "[circuit]\nmax_failures = 7\n").unwrap();

    let output = wayfarer(&path, &["config", "show"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("max_failures = 7"));
}

#[test]
fn test_config_show_rejects_invalid_value() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.ini");
    fs::write(&path, "[coordinator]\nmax_timers = 0\n").unwrap();

    let output = wayfarer(&path, &["config", "show"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("coordinator.max_timers"));
}

#[test]
fn test_config_path_prints_given_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.ini");

    let output = wayfarer(&path, &["config", "path"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(&path.display().to_string()));
}

// ============================================================================
// simulate
// ============================================================================

#[test]
fn test_simulate_reaches_destination() {
    let temp = TempDir::new().unwrap();
    let config = write_sandbox_config(temp.path());

    // ~1.1 km at 36 km/h; sixty simulated seconds per sample
    let output = wayfarer(
        &config,
        &[
            "simulate",
            "--from-lat",
            "0",
            "--from-lon",
            "0",
            "--to-lat",
            "0",
            "--to-lon",
            "0.01",
            "--max-secs",
            "20",
        ],
    );

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("arrived"), "no arrival in output:\n{out}");
    assert!(out.contains("## Coordinator"));
    assert!(temp.path().join("logs").join("wayfarer.log").exists());
}

#[test]
fn test_simulate_rejects_out_of_range_destination() {
    let temp = TempDir::new().unwrap();
    let config = write_sandbox_config(temp.path());

    let output = wayfarer(
        &config,
        &[
            "simulate",
            "--from-lat",
            "0",
            "--from-lon",
            "0",
            "--to-lat",
            "91",
            "--to-lon",
            "0",
        ],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid argument"));
}
