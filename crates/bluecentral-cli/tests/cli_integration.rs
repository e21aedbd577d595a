//! CLI Integration Tests
//!
//! These tests run the `bluecentral` binary against its simulated radio, so
//! no Bluetooth hardware is required:
//! ```
//! cargo test --package bluecentral-cli --test cli_integration
//! ```

use std::process::{Command, Output};

use tempfile::TempDir;

/// Run bluecentral with an empty config directory and return its output
fn run_bluecentral(args: &[&str]) -> Output {
    let home = TempDir::new().expect("Failed to create temp dir");
    Command::new(env!("CARGO_BIN_EXE_bluecentral"))
        .args(args)
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .env_remove("BLUECENTRAL_DEVICE")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run bluecentral binary")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, stdout))
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = run_bluecentral(&["--help"]);

    assert!(output.status.success(), "Help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bluecentral"), "Help should name the binary");
    assert!(stdout.contains("scan"), "Help should list scan command");
    assert!(stdout.contains("probe"), "Help should list probe command");
    assert!(stdout.contains("config"), "Help should list config command");
}

#[test]
fn test_version_command() {
    let output = run_bluecentral(&["--version"]);

    assert!(output.status.success(), "Version should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bluecentral"));
}

#[test]
fn test_subcommand_help() {
    for cmd in ["scan", "probe", "config"] {
        let output = run_bluecentral(&[cmd, "--help"]);

        assert!(output.status.success(), "{} --help should succeed", cmd);
        assert!(!output.stdout.is_empty(), "{} --help should produce output", cmd);
    }
}

// =============================================================================
// Simulated Radio Tests
// =============================================================================

#[test]
fn test_scan_simulated_json() {
    let output = run_bluecentral(&[
        "scan",
        "--simulate",
        "--duration",
        "1",
        "--format",
        "json",
        "--quiet",
    ]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["count"], 3);
    assert!(json["peripherals"].as_array().unwrap().iter().all(|p| p["id"].is_string()));
}

#[test]
fn test_scan_simulated_service_filter() {
    let output = run_bluecentral(&[
        "scan",
        "--simulate",
        "-t",
        "1",
        "--service",
        "180d",
        "--format",
        "json",
        "--compact",
        "-q",
    ]);

    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["count"], 1);
    assert_eq!(json["peripherals"][0]["name"], "Heart Monitor");
}

#[test]
fn test_scan_simulated_text() {
    let output = run_bluecentral(&["scan", "--simulate", "-t", "1", "--no-color", "-q"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Found 3 peripheral(s)"));
    assert!(stdout.contains("Env Sensor"));
}

#[test]
fn test_probe_simulated_json() {
    let output = run_bluecentral(&[
        "probe",
        "--simulate",
        "--device",
        "C0:FF:EE:00:00:01",
        "--format",
        "json",
        "-q",
    ]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["id"], "C0:FF:EE:00:00:01");
    assert_eq!(json["connected"], true);
    assert_eq!(json["services"].as_array().unwrap().len(), 3);

    let steps: Vec<&str> = json["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["type"].as_str().unwrap())
        .collect();
    assert_eq!(steps, vec!["connect", "rssiUpdate", "servicesDiscover", "disconnect"]);
}

#[test]
fn test_probe_device_from_env() {
    let home = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_bluecentral"))
        .args(["probe", "--simulate", "--format", "json", "-q"])
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .env("BLUECENTRAL_DEVICE", "C0:FF:EE:00:00:02")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["name"], "Env Sensor");
}

#[test]
fn test_probe_refused_connection_fails() {
    let output = run_bluecentral(&[
        "probe",
        "--simulate",
        "--device",
        "C0:FF:EE:00:00:03",
        "--no-color",
        "-q",
    ]);

    assert!(!output.status.success(), "Refused connection should fail");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FAILED"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Could not connect"));
}

#[test]
fn test_invalid_service_uuid_fails() {
    let output = run_bluecentral(&["scan", "--simulate", "--service", "nope"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid service UUID"));
}

#[test]
fn test_config_path() {
    let output = run_bluecentral(&["config", "path"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.trim_end().ends_with("config.toml"));
}
