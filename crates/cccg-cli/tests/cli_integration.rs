//! CLI Integration Tests
//!
//! These tests verify the CLI commands work correctly end-to-end.
//! They run offline: every save lands on the device only.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// Create an offline CLI command with a temporary data directory
fn cli_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cccg").expect("Failed to find cccg binary");
    cmd.env_remove("CCCG_CLOUD_URL")
        .env_remove("CCCG_CLOUD_AUTH")
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(data_dir.path())
        .arg("--offline");
    cmd
}

/// Save a character with inline JSON
fn save_character(data_dir: &TempDir, name: &str, json: &str) {
    cli_cmd(data_dir)
        .args(["character", "save", name, "--json", json])
        .assert()
        .success();
}

// ============================================================================
// Info Command Tests
// ============================================================================

#[test]
fn test_info_command() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Catalyst Core Character Vault"))
        .stdout(predicate::str::contains("Data directory:"))
        .stdout(predicate::str::contains("Cloud: offline"))
        .stdout(predicate::str::contains("Last save: (none)"));
}

#[test]
fn test_info_counts_characters() {
    let data_dir = TempDir::new().unwrap();
    save_character(&data_dir, "Nova", r#"{"hp": 12}"#);

    cli_cmd(&data_dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Characters: 1"))
        .stdout(predicate::str::contains("Last save: player:Nova"));
}

// ============================================================================
// Character Command Tests
// ============================================================================

#[test]
fn test_save_offline_reports_cloud_failure() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["character", "save", "Nova", "--json", r#"{"hp": 12}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved player:Nova"))
        .stdout(predicate::str::contains("Local: yes"))
        .stdout(predicate::str::contains("Cloud: no"));
}

#[test]
fn test_save_and_load_roundtrip() {
    let data_dir = TempDir::new().unwrap();
    save_character(&data_dir, "Nova", r#"{"hp": 12, "ui": {"scroll": 4}}"#);

    let output = cli_cmd(&data_dir)
        .args(["character", "load", "Nova"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let loaded: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(loaded["hp"], 12);
    // Local copies keep their UI state
    assert_eq!(loaded["ui"]["scroll"], 4);
}

#[test]
fn test_save_from_file() {
    let data_dir = TempDir::new().unwrap();
    let sheet = data_dir.path().join("sheet.json");
    std::fs::write(&sheet, r#"{"stats": {"hp": 10}}"#).unwrap();

    cli_cmd(&data_dir)
        .args(["character", "save", "Tester", "--file"])
        .arg(&sheet)
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["character", "load", "Tester"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"hp\": 10"));
}

#[test]
fn test_save_rejects_non_object() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["character", "save", "Nova", "--json", "[1, 2, 3]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON object"));
}

#[test]
fn test_save_requires_input() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["character", "save", "Nova"])
        .assert()
        .failure();
}

#[test]
fn test_load_missing_offline_fails() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["character", "load", "Nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Network unreachable"));
}

#[test]
fn test_list_empty() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["character", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No characters found."));
}

#[test]
fn test_list_characters() {
    let data_dir = TempDir::new().unwrap();
    save_character(&data_dir, "Nova", "{}");
    save_character(&data_dir, "The DM", "{}");

    cli_cmd(&data_dir)
        .args(["character", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Characters (2):"))
        .stdout(predicate::str::contains("  Nova"))
        .stdout(predicate::str::contains("  The DM"));
}

#[test]
fn test_rename_character() {
    let data_dir = TempDir::new().unwrap();
    save_character(&data_dir, "Nova", r#"{"hp": 5}"#);

    cli_cmd(&data_dir)
        .args(["character", "rename", "Nova", "Nova Prime"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Renamed Nova -> Nova Prime"));

    cli_cmd(&data_dir)
        .args(["character", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Characters (1):"))
        .stdout(predicate::str::contains("Nova Prime"));
}

#[test]
fn test_delete_character() {
    let data_dir = TempDir::new().unwrap();
    save_character(&data_dir, "Nova", "{}");

    cli_cmd(&data_dir)
        .args(["character", "delete", "Nova"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted character: Nova"));

    cli_cmd(&data_dir)
        .args(["character", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No characters found."));
}

#[test]
fn test_director_character_cannot_be_deleted() {
    let data_dir = TempDir::new().unwrap();
    save_character(&data_dir, "The DM", "{}");

    cli_cmd(&data_dir)
        .args(["character", "delete", "The DM"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid operation"));
}

#[test]
fn test_legacy_director_name_lists_as_director() {
    let data_dir = TempDir::new().unwrap();
    save_character(&data_dir, "Shawn", r#"{"notes": []}"#);

    cli_cmd(&data_dir)
        .args(["character", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Characters (1):"))
        .stdout(predicate::str::contains("  The DM"));
}

// ============================================================================
// PIN Command Tests
// ============================================================================

#[test]
fn test_pin_locks_character() {
    let data_dir = TempDir::new().unwrap();
    std::fs::write(
        data_dir.path().join("config.json"),
        r#"{ "passwordIterations": 10 }"#,
    )
    .unwrap();
    save_character(&data_dir, "Nova", r#"{"hp": 12}"#);

    cli_cmd(&data_dir)
        .args(["character", "pin", "set", "Nova", "1357"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PIN set for Nova"));

    cli_cmd(&data_dir)
        .args(["character", "pin", "status", "Nova"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nova: locked"));

    cli_cmd(&data_dir)
        .args(["character", "load", "Nova"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("locked by a PIN"));

    cli_cmd(&data_dir)
        .args(["character", "load", "Nova", "--pin", "0000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid PIN"));

    cli_cmd(&data_dir)
        .args(["character", "load", "Nova", "--pin", "1357"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"hp\": 12"));

    cli_cmd(&data_dir)
        .args(["character", "pin", "clear", "Nova", "--pin", "1357"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["character", "load", "Nova"])
        .assert()
        .success();
}

#[test]
fn test_pin_follows_rename() {
    let data_dir = TempDir::new().unwrap();
    std::fs::write(
        data_dir.path().join("config.json"),
        r#"{ "passwordIterations": 10 }"#,
    )
    .unwrap();
    save_character(&data_dir, "Nova", r#"{"hp": 5}"#);
    cli_cmd(&data_dir)
        .args(["character", "pin", "set", "Nova", "1357"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["character", "rename", "Nova", "Nova Prime"])
        .assert()
        .failure();

    cli_cmd(&data_dir)
        .args(["character", "rename", "Nova", "Nova Prime", "--pin", "1357"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["character", "pin", "status", "Nova Prime"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nova Prime: locked"));

    cli_cmd(&data_dir)
        .args(["character", "delete", "Nova Prime"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unauthorized"));
}

// ============================================================================
// Player Command Tests
// ============================================================================

#[test]
fn test_register_and_login() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["player", "register", "Eve", "--password", "pw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Registered player: Eve"));

    cli_cmd(&data_dir)
        .args(["player", "login", "Eve", "--password", "pw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as Eve"))
        .stdout(predicate::str::contains("(new sheet)"));

    cli_cmd(&data_dir)
        .args(["character", "list", "--profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profiles (1):"));
}

#[test]
fn test_login_wrong_password() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["player", "register", "Eve", "--password", "pw"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["player", "login", "Eve", "--password", "wrong"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unauthorized"));
}

#[test]
fn test_register_twice_fails() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["player", "register", "Eve", "--password", "pw"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .args(["player", "register", "Eve", "--password", "pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Already exists"));
}

// ============================================================================
// DM Command Tests
// ============================================================================

#[test]
fn test_dm_login_without_pin_configured() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["dm", "login", "--pin", "2468"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DM login failed"));
}

#[test]
fn test_generate_pin_then_login() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["dm", "generate-pin", "Dragons22!", "--iterations", "1000", "--save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"digest\": \"SHA-256\""))
        .stdout(predicate::str::contains("\"iterations\": 1000"));

    cli_cmd(&data_dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("DM PIN: configured"));

    cli_cmd(&data_dir)
        .args(["dm", "login", "--pin", "Dragons22!"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as The DM"));

    cli_cmd(&data_dir)
        .args(["dm", "login", "--pin", "0000"])
        .assert()
        .failure();
}

// ============================================================================
// Cache and Backups Command Tests
// ============================================================================

#[test]
fn test_cache_refresh_offline_fails() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["cache", "refresh"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Network unreachable"));
}

#[test]
fn test_backups_need_cloud() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["backups", "list", "Nova"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Network unreachable"));
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[test]
fn test_blank_name_is_rejected() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["character", "load", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid key"));
}

#[test]
fn test_invalid_config_file() {
    let data_dir = TempDir::new().unwrap();
    std::fs::write(data_dir.path().join("config.json"), "{ not json").unwrap();

    cli_cmd(&data_dir)
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config error"));
}
