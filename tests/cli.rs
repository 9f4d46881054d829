mod common;

use std::fs;

use common::faqdaemon_bin;

#[test]
fn version_flag_prints_package_version() {
    let output = faqdaemon_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("faqdaemon {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn help_lists_commands_and_options() {
    let output = faqdaemon_bin().arg("-h").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("install-service"));
    assert!(stdout.contains("--config"));
}

#[test]
fn missing_config_fails_with_path_in_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let output = faqdaemon_bin()
        .arg("--config")
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.toml"));
}

#[test]
fn config_without_bot_token_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        format!(
            "[admin]\nid = \"42\"\n\n[storage]\nknowledge_path = \"{}\"\nhistory_path = \"{}\"\n\n[daemon]\nhealth_port = 0\n",
            dir.path().join("knowledge.json").display(),
            dir.path().join("history.json").display(),
        ),
    )
    .unwrap();

    let output = faqdaemon_bin()
        .arg("--config")
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("bot_token"));
    // The knowledge base is created before the transport is configured.
    assert!(dir.path().join("knowledge.json").exists());
}

#[test]
fn unknown_argument_exits_with_usage() {
    let output = faqdaemon_bin().arg("--bogus").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage: faqdaemon"));
}
