//! Exit status of the command-line front end

use std::process::Command;

use tempfile::TempDir;

#[test]
fn test_stats_on_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("no_such_dataset");

    let output = Command::new(env!("CARGO_BIN_EXE_caltech_finetune"))
        .args(["--quiet", "stats", "--data-dir"])
        .arg(&missing)
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Expected structure"));
}

#[test]
fn test_init_config_succeeds() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("caltech.json");

    let status = Command::new(env!("CARGO_BIN_EXE_caltech_finetune"))
        .args(["--quiet", "init-config", "--output"])
        .arg(&path)
        .status()
        .unwrap();

    assert!(status.success());
    let json = std::fs::read_to_string(&path).unwrap();
    assert!(json.contains("\"conv_layers\""));
}
