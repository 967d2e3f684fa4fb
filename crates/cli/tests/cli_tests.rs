//! CLI integration tests

use std::io::Write;
use std::process::{Command, Output};

const TOPOLOGY: &str = r#"
topology:
  services:
    frontend:
      routes:
        /home:
          maxLatencyMillis: 20
          downstreamCalls:
            - service: backend
              route: /data
    backend:
      metrics:
        - name: queue_depth
          type: gauge
          min: 0
          max: 5
      routes:
        /data:
          maxLatencyMillis: 5
flags:
  - name: canary
rootRoutes:
  - service: frontend
    route: /home
    tracesPerHour: 60
"#;

fn tgctl(args: &[&str]) -> Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "tgctl", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn topology_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = tgctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Telemetry Generator"), "Should show app name");
    assert!(stdout.contains("validate"), "Should show validate command");
    assert!(stdout.contains("sample"), "Should show sample command");
    assert!(stdout.contains("convert"), "Should show convert command");
    assert!(stdout.contains("flags"), "Should show flags command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("TGCTL_API_URL"), "Should show env var");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = tgctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("tgctl"), "Should show binary name");
}

/// Test sample subcommand help
#[test]
fn test_sample_help() {
    let output = tgctl(&["sample", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Sample help should succeed");
    assert!(stdout.contains("--service"), "Should show service option");
    assert!(stdout.contains("--route"), "Should show route option");
    assert!(stdout.contains("--count"), "Should show count option");
    assert!(stdout.contains("--seed"), "Should show seed option");
}

/// Test flags set subcommand help
#[test]
fn test_flags_set_help() {
    let output = tgctl(&["flags", "set", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Flags set help should succeed");
    assert!(stdout.contains("<NAME>"), "Should show name argument");
    assert!(stdout.contains("<ENABLED>"), "Should show enabled argument");
}

#[test]
fn test_validate_accepts_good_topology() {
    let file = topology_file(TOPOLOGY);
    let output = tgctl(&["validate", file.path().to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Validate should succeed: {}", stdout);
    assert!(stdout.contains("frontend"));
    assert!(stdout.contains("is valid"));
}

#[test]
fn test_validate_reports_every_error() {
    let broken = TOPOLOGY
        .replace("service: backend", "service: missing")
        .replace("tracesPerHour: 60", "tracesPerHour: 0");
    let file = topology_file(&broken);
    let output = tgctl(&["validate", file.path().to_str().unwrap()]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Validate should fail");
    assert!(stderr.contains("unknown service missing"), "stderr: {}", stderr);
    assert!(stderr.contains("frontend//home"), "stderr: {}", stderr);
    assert!(stderr.contains("2 validation error(s)"), "stderr: {}", stderr);
}

#[test]
fn test_sample_json_is_reproducible() {
    let file = topology_file(TOPOLOGY);
    let path = file.path().to_str().unwrap();
    let args = ["--format", "json", "sample", path, "-n", "2", "--seed", "7"];

    let first = tgctl(&args);
    assert!(first.status.success());
    let stdout = String::from_utf8_lossy(&first.stdout);
    let traces: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0]["spans"].as_array().unwrap().len(), 2);

    let second = tgctl(&args);
    let spans = |out: &Output| -> Vec<serde_json::Value> {
        String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["spans"][0]["span_id"].clone())
            .collect()
    };
    assert_eq!(spans(&first), spans(&second));
}

#[test]
fn test_sample_rejects_unknown_route() {
    let file = topology_file(TOPOLOGY);
    let output = tgctl(&[
        "sample",
        file.path().to_str().unwrap(),
        "--service",
        "frontend",
        "--route",
        "/nope",
    ]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown route frontend//nope"));
}

#[test]
fn test_convert_to_json() {
    let file = topology_file(TOPOLOGY);
    let output = tgctl(&["convert", file.path().to_str().unwrap(), "--to", "json"]);

    assert!(output.status.success());
    let document: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(document["rootRoutes"][0]["tracesPerHour"], 60);
    assert!(document["topology"]["services"]["backend"].is_object());
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = tgctl(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let output = tgctl(&["flags", "set", "canary"]);

    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}
