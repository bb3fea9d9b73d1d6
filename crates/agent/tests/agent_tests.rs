//! Agent integration tests
//!
//! Run the real binary for a bounded number of cycles against a temporary log.

use std::path::Path;
use std::process::{Command, Output};

const HEADER: &str =
    "Timestamp,CPU_Usage,CPU_Memory_Usage,CPU_Temperature,GPU_Usage,GPU_Memory_Usage,GPU_Temperature";

fn run_agent(dir: &Path, log_path: &Path, cycles: u32) -> Output {
    Command::new(env!("CARGO_BIN_EXE_telemetry-agent"))
        .current_dir(dir)
        .env("TELEMETRY_CONFIG", dir.join("absent.toml"))
        .env("TELEMETRY_LOG_PATH", log_path)
        .env("TELEMETRY_INTERVAL_MS", "100")
        .env("TELEMETRY_CPU_WINDOW_MS", "50")
        .env("TELEMETRY_MAX_CYCLES", cycles.to_string())
        .env("TELEMETRY_DISABLE_GPU", "true")
        .env("TELEMETRY_FORECAST_ENABLED", "false")
        .env("TELEMETRY_FSYNC_EACH_APPEND", "false")
        .output()
        .expect("Failed to execute telemetry-agent")
}

#[test]
fn test_bounded_run_writes_log() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("logs").join("system_monitor.csv");

    let output = run_agent(dir.path(), &log_path, 3);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "agent failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert_eq!(
        stdout.matches("GPU Not Found: disabled by configuration").count(),
        1
    );
    assert_eq!(stdout.matches("| CPU: ").count(), 3);

    let log = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines[0], HEADER);
    assert_eq!(lines.len(), 4);
    for row in &lines[1..] {
        assert!(row.ends_with(",N/A,N/A,N/A"), "unexpected row {}", row);
    }
}

#[test]
fn test_restart_appends_without_second_header() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("system_monitor.csv");

    assert!(run_agent(dir.path(), &log_path, 1).status.success());
    assert!(run_agent(dir.path(), &log_path, 2).status.success());

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.matches(HEADER).count(), 1);
    assert_eq!(log.lines().count(), 4);
}

#[test]
fn test_foreign_log_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("system_monitor.csv");
    std::fs::write(&log_path, "Time,CPU\n2024-01-01 00:00:00,5\n").unwrap();

    let output = run_agent(dir.path(), &log_path, 1);
    assert!(!output.status.success());
    assert_eq!(
        std::fs::read_to_string(&log_path).unwrap(),
        "Time,CPU\n2024-01-01 00:00:00,5\n"
    );
}
