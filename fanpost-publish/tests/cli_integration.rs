//! CLI integration tests for fanpost-publish

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Config with a database in a temp dir and no platforms configured
fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("fanpost.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[tokens]
backend = "memory"
"#,
        escape_path_for_toml(&db_path.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path.to_string_lossy().to_string())
}

#[test]
fn test_help_flag_output() {
    Command::cargo_bin("fanpost-publish")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--platform"))
        .stdout(predicate::str::contains("--media"))
        .stdout(predicate::str::contains("--generate"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_unknown_platform_is_invalid_input() {
    Command::cargo_bin("fanpost-publish")
        .unwrap()
        .args(["--user", "ana", "--platform", "tiktok,myspace", "hello"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("myspace"));
}

#[test]
fn test_empty_stdin_is_invalid_input() {
    let (_temp_dir, config_path) = setup_test_env();

    Command::cargo_bin("fanpost-publish")
        .unwrap()
        .args(["--user", "ana", "--platform", "facebook", "--config", &config_path])
        .write_stdin("")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("empty"));
}

#[test]
fn test_unconfigured_platform_reported() {
    let (_temp_dir, config_path) = setup_test_env();

    Command::cargo_bin("fanpost-publish")
        .unwrap()
        .args([
            "--user",
            "ana",
            "--platform",
            "facebook,whatsapp",
            "--config",
            &config_path,
            "hello",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("facebook: error platform not configured"))
        .stdout(predicate::str::contains("whatsapp: error platform not configured"));
}

#[test]
fn test_json_output() {
    let (_temp_dir, config_path) = setup_test_env();

    let output = Command::cargo_bin("fanpost-publish")
        .unwrap()
        .args([
            "--user",
            "ana",
            "--platform",
            "linkedin",
            "--config",
            &config_path,
            "--format",
            "json",
            "hello",
        ])
        .output()
        .unwrap();

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["user_id"], "ana");
    assert_eq!(json["results"][0]["platform"], "linkedin");
    assert_eq!(json["results"][0]["status"], "error");
}

#[test]
fn test_generate_without_generator_section() {
    let (_temp_dir, config_path) = setup_test_env();

    Command::cargo_bin("fanpost-publish")
        .unwrap()
        .args([
            "--user",
            "ana",
            "--platform",
            "facebook",
            "--config",
            &config_path,
            "--generate",
            "open day",
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("[generator]"));
}

#[test]
fn test_help_exit_code_two_is_needs_auth_only() {
    Command::cargo_bin("fanpost-publish")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 - Every failure was a missing authorization (needs_auth)"));
}

#[test]
fn test_media_is_copied_into_media_dir() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let media_dir = temp_dir.path().join("media");
    let poster = temp_dir.path().join("poster.png");
    fs::write(&poster, b"png bytes").unwrap();

    let config_content = format!(
        r#"
[database]
path = "{}"

[media]
dir = "{}"

[tokens]
backend = "memory"
"#,
        escape_path_for_toml(&temp_dir.path().join("fanpost.db").to_string_lossy()),
        escape_path_for_toml(&media_dir.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    Command::cargo_bin("fanpost-publish")
        .unwrap()
        .args([
            "--user",
            "ana",
            "--platform",
            "facebook",
            "--config",
            &config_path.to_string_lossy(),
            "--media",
            &poster.to_string_lossy(),
            "Applications are open",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("facebook: error platform not configured"));

    let stored: Vec<_> = fs::read_dir(&media_dir).unwrap().collect();
    assert_eq!(stored.len(), 1);
}
