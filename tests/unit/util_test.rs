//! Tests for utility functions

use fleet_coordination::util::clock::now_ms;
use fleet_coordination::util::serde::{WorkerKind, WorkerStatus};

#[test]
fn test_now_ms_advances() {
    let first = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > first);
}

#[test]
fn test_worker_kind_wire_names() {
    assert_eq!(serde_json::to_string(&WorkerKind::Extractor).unwrap(), "\"extractor\"");
    assert_eq!(serde_json::to_string(&WorkerKind::Transport).unwrap(), "\"transport\"");
    let status: WorkerStatus = serde_json::from_str("\"failed\"").unwrap();
    assert_eq!(status, WorkerStatus::Failed);
}

#[test]
fn test_init_tracing_is_idempotent() {
    fleet_coordination::util::telemetry::init_tracing();
    fleet_coordination::util::telemetry::init_tracing();
}
