//! CLI tests for gw-backup.
//!
//! These run the binary against temp dirs and check exit codes and the
//! JSON payload on stdout.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a Command for the gw-backup binary, pointed at `home` as a 5.1
/// gateway.
fn gw_backup(home: &TempDir) -> Command {
    gw_backup_at(home, "5.1.0")
}

fn gw_backup_at(home: &TempDir, build_version: &str) -> Command {
    let mut cmd = Command::cargo_bin("gw-backup").expect("gw-backup binary should exist");
    cmd.env_remove("GW_BACKUP_CONFIG")
        .env_remove("GW_BUILD_VERSION")
        .env_remove("RUST_LOG")
        .env_remove("GW_LOG")
        .args(["--home", &home.path().to_string_lossy()])
        .args(["--var-dir", &home.path().join("var").to_string_lossy()])
        .args(["--build-version", build_version]);
    cmd
}

// ============================================================================
// Arguments
// ============================================================================

mod arguments {
    use super::*;

    #[test]
    fn help_succeeds() {
        let home = TempDir::new().unwrap();
        gw_backup(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("export"));
    }

    #[test]
    fn unknown_command_is_args_error() {
        let home = TempDir::new().unwrap();
        gw_backup(&home)
            .arg("nonexistent-command")
            .assert()
            .code(10)
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn unknown_flag_is_args_error() {
        let home = TempDir::new().unwrap();
        gw_backup(&home)
            .args(["export", "--nonexistent-flag"])
            .assert()
            .code(10);
    }

    #[test]
    fn export_without_image_is_args_error() {
        let home = TempDir::new().unwrap();
        gw_backup(&home)
            .args(["export", "--config"])
            .assert()
            .code(10)
            .stdout(predicate::str::contains("\"exit_code_name\": \"ERR_ARGS\""))
            .stdout(predicate::str::contains("-image"));
    }

    #[test]
    fn import_of_missing_image_is_args_error() {
        let home = TempDir::new().unwrap();
        gw_backup(&home)
            .args(["import", "--image", "/no/such/image.zip", "--ma"])
            .assert()
            .code(10);
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod configuration {
    use super::*;

    #[test]
    fn old_gateway_is_config_error() {
        let home = TempDir::new().unwrap();
        gw_backup_at(&home, "4.6.5")
            .args(["export", "--image", "x.zip"])
            .assert()
            .code(11)
            .stdout(predicate::str::contains("ERR_CONFIG"));
    }

    #[test]
    fn missing_build_version_is_config_error() {
        let home = TempDir::new().unwrap();
        Command::cargo_bin("gw-backup")
            .unwrap()
            .env_remove("GW_BACKUP_CONFIG")
            .env_remove("GW_BUILD_VERSION")
            .args(["--home", &home.path().to_string_lossy(), "status"])
            .assert()
            .code(11);
    }

    #[test]
    fn config_file_supplies_build_version() {
        let home = TempDir::new().unwrap();
        let config = home.path().join("gw-backup.toml");
        fs::write(&config, "build_version = \"5.2\"\n").unwrap();
        Command::cargo_bin("gw-backup")
            .unwrap()
            .env_remove("GW_BUILD_VERSION")
            .args(["--home", &home.path().to_string_lossy()])
            .args(["--var-dir", &home.path().join("var").to_string_lossy()])
            .args(["--config-file", &config.to_string_lossy(), "status"])
            .assert()
            .success();
    }
}

// ============================================================================
// Commands
// ============================================================================

mod commands {
    use super::*;

    #[test]
    fn version_prints_json() {
        let home = TempDir::new().unwrap();
        gw_backup(&home)
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("gw_backup_version"));
    }

    #[test]
    fn status_without_pending_restore() {
        let home = TempDir::new().unwrap();
        let output = gw_backup(&home).arg("status").output().unwrap();
        assert!(output.status.success());
        let payload: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(payload["command"], "status");
        assert_eq!(payload["result"]["state"], "none");
        assert_eq!(payload["result"]["file_count"], 0);
    }

    #[test]
    fn apply_os_with_nothing_pending() {
        let home = TempDir::new().unwrap();
        let output = gw_backup(&home).arg("apply-os").output().unwrap();
        assert!(output.status.success());
        let payload: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(payload["result"]["outcome"], "nothing_pending");
    }

    #[test]
    fn export_config_summary() {
        let home = TempDir::new().unwrap();
        let conf = home.path().join("Gateway/node/default/etc/conf");
        fs::create_dir_all(&conf).unwrap();
        fs::write(conf.join("node.properties"), "node.id=1\n").unwrap();
        fs::write(conf.join("system.properties"), "a=b\n").unwrap();
        let image = home.path().join("node.zip");

        gw_backup(&home)
            .args(["--no-unique-image-name", "--format", "summary"])
            .args(["export", "--config", "--image", &image.to_string_lossy()])
            .assert()
            .success()
            .stdout(predicate::str::contains("export: SUCCESS"));
        assert!(image.is_file());
    }

    #[test]
    fn exitcode_format_prints_nothing() {
        let home = TempDir::new().unwrap();
        gw_backup(&home)
            .args(["--format", "exitcode", "export"])
            .assert()
            .code(10)
            .stdout(predicate::str::is_empty());
    }
}
