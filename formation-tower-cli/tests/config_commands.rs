//! Integration tests for the `config` subcommands.
//!
//! Each test points the binary at a file in a temporary directory.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn run_cli(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_towerctl"))
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("Failed to execute CLI command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_init_writes_default_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("tower.ini");

    let output = run_cli(&path, &["config", "init"]);
    assert!(output.status.success(), "{:?}", output);
    assert!(path.exists());

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("[tower]"));
    assert!(text.contains("[cell_map]"));
}

#[test]
fn test_init_refuses_to_overwrite() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tower.ini");
    std::fs::write(&path, "[tower]\nline = CM9\n").unwrap();

    let output = run_cli(&path, &["config", "init"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));
    assert!(std::fs::read_to_string(&path).unwrap().contains("CM9"));

    let output = run_cli(&path, &["config", "init", "--force"]);
    assert!(output.status.success());
    assert!(!std::fs::read_to_string(&path).unwrap().contains("CM9"));
}

#[test]
fn test_show_reflects_file_values() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tower.ini");
    std::fs::write(&path, "[tower]\nline = CM9\n\n[workflow]\nqueue_depth = 3\n").unwrap();

    let output = run_cli(&path, &["config", "show"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("line = CM9"));
    assert!(text.contains("queue_depth = 3"));
}

#[test]
fn test_show_missing_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("absent.ini");

    let output = run_cli(&path, &["config", "show"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("not found, showing defaults"));
    assert!(text.contains("line = CM2"));
}

#[test]
fn test_show_rejects_invalid_value() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tower.ini");
    std::fs::write(&path, "[workflow]\nqueue_depth = 0\n").unwrap();

    let output = run_cli(&path, &["config", "show"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("queue_depth"));
}

#[test]
fn test_path_prints_override() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tower.ini");

    let output = run_cli(&path, &["config", "path"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), path.display().to_string());
}
