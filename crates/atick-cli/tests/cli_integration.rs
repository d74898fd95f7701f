//! CLI Integration Tests
//!
//! These tests verify the CLI binary output formats and command behaviors.
//! None of them require BLE hardware.
//!
//! ```
//! cargo test --package atick-cli --test cli_integration
//! ```

use std::process::{Command, Output};

/// Run the atick binary built for this test target.
fn run_atick(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_atick"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("ATICK_MAC")
        .env_remove("ATICK_PIN")
        .output()
        .expect("Failed to run atick binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = run_atick(&["--help"]);

    assert!(output.status.success(), "Help should succeed");

    let stdout = stdout(&output);
    assert!(stdout.contains("aTick"), "Help should mention aTick");
    for cmd in ["decode", "gatt", "config", "poll"] {
        assert!(stdout.contains(cmd), "Help should list {} command", cmd);
    }
}

#[test]
fn test_version_command() {
    let output = run_atick(&["--version"]);

    assert!(output.status.success(), "Version should succeed");
    assert!(stdout(&output).contains("atick"));
}

#[test]
fn test_subcommand_help() {
    for cmd in ["decode", "gatt", "config", "poll"] {
        let output = run_atick(&[cmd, "--help"]);

        assert!(output.status.success(), "{} --help should succeed", cmd);
        assert!(
            !stdout(&output).is_empty(),
            "{} --help should produce output",
            cmd
        );
    }
}

// =============================================================================
// Decode Command
// =============================================================================

#[test]
fn test_decode_encrypted_json() {
    let output = run_atick(&[
        "decode",
        "--mac",
        "AA:BB:CC:DD:EE:FF",
        "--format",
        "json",
        "00 14 a0 e2 62 fb dc 78 7b",
    ]);

    assert!(output.status.success(), "Decode should succeed");

    let json: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("Decode should print JSON");
    assert_eq!(json["encrypted"], true);
    assert_eq!(json["key"], 0xE2);
    assert_eq!(json["counter_a"], 123.25);
    assert_eq!(json["counter_b"], 0.15);
}

#[test]
fn test_decode_plain_text() {
    let output = run_atick(&[
        "decode",
        "--mac",
        "AA:BB:CC:DD:EE:FF",
        "000080f64200000040",
    ]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Encrypted:  no"));
    assert!(stdout.contains("123.25"));
}

#[test]
fn test_decode_requires_mac() {
    let output = run_atick(&["decode", "000080f64200000040"]);
    assert!(!output.status.success(), "Decode without --mac should fail");
}

#[test]
fn test_decode_rejects_bad_hex() {
    let output = run_atick(&["decode", "--mac", "AA:BB:CC:DD:EE:FF", "zz"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid payload"), "stderr: {}", stderr);
}

// =============================================================================
// Gatt Command
// =============================================================================

#[test]
fn test_gatt_ratio_json() {
    let output = run_atick(&[
        "gatt",
        "--ratio",
        "--format",
        "json",
        "--compact",
        "0ad7233c0ad7233c",
    ]);

    assert!(output.status.success());
    assert_eq!(stdout(&output), "{\"kind\":\"Ratios\",\"a\":0.01,\"b\":0.01}\n");
}

// =============================================================================
// Config Command
// =============================================================================

#[test]
fn test_config_prints_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("atick.toml");
    std::fs::write(&path, "address = \"AA:BB:CC:DD:EE:FF\"\nname = \"Garden\"\n").unwrap();

    let output = run_atick(&["config", "--path", path.to_str().unwrap()]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Garden"));
    assert!(stdout.contains("86400s"));
    assert!(stdout.contains("ratio 0.01"));
}

#[test]
fn test_config_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.toml");

    let output = run_atick(&["config", "--path", path.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_output_flag_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("decoded.json");

    let output = run_atick(&[
        "decode",
        "--mac",
        "AA:BB:CC:DD:EE:FF",
        "--format",
        "json",
        "--output",
        out.to_str().unwrap(),
        "000080f64200000040",
    ]);

    assert!(output.status.success());
    assert!(stdout(&output).is_empty());
    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.contains("\"counter_b\": 2.0"));
}

// =============================================================================
// Poll Command (no BLE hardware: only argument handling is exercised)
// =============================================================================

#[test]
fn test_poll_with_invalid_config_fails_before_scanning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("atick.toml");
    std::fs::write(&path, "address = \"not-a-mac\"\n").unwrap();

    let output = run_atick(&["poll", "--config", path.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("address"), "stderr: {}", stderr);
}
