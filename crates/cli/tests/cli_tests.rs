//! Integration tests for the wdtctl binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn wdtctl() -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("wdtctl")?;
    cmd.env_remove("WDTCTL_FREQUENCY")
        .env_remove("WDTCTL_CONFIG")
        .env_remove("RUST_LOG");
    Ok(cmd)
}

fn json_output(cmd: &mut Command) -> Result<Value, Box<dyn std::error::Error>> {
    let output = cmd.output()?;
    assert!(output.status.success(), "command failed: {output:?}");
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

#[test]
fn test_info_human() -> TestResult {
    wdtctl()?
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Max timeout:    25.87s"))
        .stdout(predicate::str::contains("Auto"));
    Ok(())
}

#[test]
fn test_info_json() -> TestResult {
    let value = json_output(wdtctl()?.args(["info", "--json"]))?;
    assert_eq!(field(&value, &["success"]), Some(&Value::Bool(true)));
    let max = field(&value, &["info", "max_timeout"])
        .and_then(Value::as_f64)
        .ok_or("missing max_timeout")?;
    assert!((max - 25.87).abs() < 0.01);
    assert_eq!(
        field(&value, &["info", "counter_bits"]).and_then(Value::as_u64),
        Some(32)
    );
    Ok(())
}

#[test]
fn test_clamp_above_maximum() -> TestResult {
    let value = json_output(wdtctl()?.args(["clamp", "40", "--json"]))?;
    assert_eq!(
        field(&value, &["clamp", "warning"]).and_then(Value::as_str),
        Some("above_maximum")
    );
    let applied = field(&value, &["clamp", "applied"])
        .and_then(Value::as_f64)
        .ok_or("missing applied")?;
    assert!(applied < 25.88 && applied > 25.86);
    Ok(())
}

#[test]
fn test_clamp_within_range() -> TestResult {
    wdtctl()?
        .args(["clamp", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Accepted"))
        .stdout(predicate::str::contains("10.00s"));
    Ok(())
}

#[test]
fn test_simulate_with_pings_never_expires() -> TestResult {
    let value = json_output(wdtctl()?.args([
        "simulate",
        "--timeout",
        "2",
        "--ping-every",
        "1",
        "--duration",
        "30",
        "--json",
    ]))?;
    assert_eq!(
        field(&value, &["simulation", "expiries"]).and_then(Value::as_u64),
        Some(0)
    );
    assert_eq!(
        field(&value, &["simulation", "pings"]).and_then(Value::as_u64),
        Some(30)
    );
    Ok(())
}

#[test]
fn test_simulate_without_pings_resets() -> TestResult {
    let value = json_output(wdtctl()?.args(["simulate", "--timeout", "2", "--duration", "10", "--json"]))?;
    assert_eq!(
        field(&value, &["simulation", "halted"]).and_then(Value::as_bool),
        Some(true)
    );
    assert_eq!(
        field(&value, &["simulation", "restart_attempts"]).and_then(Value::as_u64),
        Some(1)
    );
    Ok(())
}

#[test]
fn test_escalate_reports_fallback_delay() -> TestResult {
    let value = json_output(wdtctl()?.args(["escalate", "--timeout", "2", "--json"]))?;
    let expiry = field(&value, &["escalation", "expiry_at_secs"])
        .and_then(Value::as_f64)
        .ok_or("missing expiry")?;
    let delay = field(&value, &["escalation", "fallback_delay_secs"])
        .and_then(Value::as_f64)
        .ok_or("missing delay")?;
    assert!((expiry - 2.0).abs() < 0.02);
    assert!((delay - 2.0).abs() < 0.02);
    assert_eq!(
        field(&value, &["escalation", "restart_attempts"]).and_then(Value::as_u64),
        Some(1)
    );
    Ok(())
}

#[test]
fn test_config_file_sets_policy() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("wdt.json");
    fs::write(&path, r#"{"stop_policy": "no_way_out", "identity": "bench-rig"}"#)?;

    let value = json_output(wdtctl()?.arg("info").arg("--json").arg("--config").arg(&path))?;
    assert_eq!(
        field(&value, &["info", "identity"]).and_then(Value::as_str),
        Some("bench-rig")
    );
    assert_eq!(
        field(&value, &["info", "options", "magic_close"]).and_then(Value::as_bool),
        Some(false)
    );
    Ok(())
}

#[test]
fn test_invalid_config_exit_code() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json")?;

    wdtctl()?
        .arg("info")
        .arg("--config")
        .arg(&path)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("invalid configuration"));
    Ok(())
}

#[test]
fn test_zero_frequency_exit_code() -> TestResult {
    wdtctl()?
        .args(["info", "--frequency", "0"])
        .assert()
        .code(3);
    Ok(())
}

#[test]
fn test_counter_too_narrow_exit_code() -> TestResult {
    wdtctl()?
        .args(["info", "--frequency", "1000", "--bits", "8"])
        .assert()
        .code(4);
    Ok(())
}

#[test]
fn test_negative_timeout_rejected() -> TestResult {
    wdtctl()?
        .args(["simulate", "--timeout=-1", "--json"])
        .assert()
        .code(4)
        .stdout(predicate::str::contains("\"success\": false"));
    Ok(())
}
