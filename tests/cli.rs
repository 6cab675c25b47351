// Command-line integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn netpulse() -> Command {
    let mut cmd = Command::cargo_bin("netpulse").unwrap();
    cmd.env_remove("NETPULSE_DATA_DIR");
    cmd
}

fn write_config(dir: &Path, primary_command: &str) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    std::fs::write(
        &path,
        format!("primary_command: '{}'\ninitial_backoff_secs: 0\n", primary_command),
    )
    .unwrap();
    path
}

#[test]
fn test_version_flag() {
    netpulse()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("netpulse v"));
}

#[test]
fn test_build_info_flag() {
    netpulse()
        .arg("--build-info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Target:"));
}

#[test]
fn test_require_and_forbid_primary_conflict() {
    netpulse()
        .args(["--require-primary", "--no-primary"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_non_numeric_server_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    netpulse()
        .args(["--servers", "20013,abc", "--data-dir"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not numeric"));
}

#[test]
fn test_write_config() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("out").join("config.yaml");
    netpulse()
        .args(["--interval", "600", "--write-config"])
        .arg(&target)
        .assert()
        .success();

    let written = std::fs::read_to_string(&target).unwrap();
    assert!(written.contains("interval_secs: 600"));
}

#[test]
fn test_required_primary_missing_fails_run() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "/nonexistent/speedtest-cli-for-tests");
    netpulse()
        .arg("--require-primary")
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unavailable"));

    // first-run setup still happened
    let main = std::fs::read_to_string(dir.path().join("data").join("speedtest_results.csv")).unwrap();
    assert_eq!(
        main.trim_end(),
        "timestamp,ping_ms,download_mbps,upload_mbps,server_id,server_name,engine"
    );
}

#[cfg(unix)]
#[test]
fn test_single_cycle_with_fake_primary_tool() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let tool = dir.path().join("fake-speedtest");
    std::fs::write(
        &tool,
        r#"#!/bin/sh
cat <<'EOF'
{"ping": {"latency": 9.87654}, "download": {"bandwidth": 25000000}, "upload": {"bandwidth": 5000000},
 "server": {"id": 20013, "name": "Example ISP", "location": "Springfield"}}
EOF
"#,
    )
    .unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = write_config(dir.path(), &tool.to_string_lossy());
    let data = dir.path().join("data");
    netpulse()
        .args(["--require-primary", "--servers", "20013", "--config"])
        .arg(&config)
        .arg("--data-dir")
        .arg(&data)
        .assert()
        .success();

    let main = std::fs::read_to_string(data.join("speedtest_results.csv")).unwrap();
    let rows: Vec<&str> = main.lines().collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].ends_with(",9.877,200,40,20013,Example ISP - Springfield,primary"));

    let archives: Vec<_> = std::fs::read_dir(data.join("archive")).unwrap().collect();
    assert_eq!(archives.len(), 1);
}
