//! Tests for coordination builders

use std::sync::Arc;

use fleet_coordination::builders::build_coordination;
use fleet_coordination::config::CoordinationConfig;
use fleet_coordination::core::{CoordinationAction, DirectRouteOracle, ResourceLedger};

#[test]
fn test_build_from_json_config() {
    let cfg = CoordinationConfig::from_json_str(r#"{"search": {"worker_count": 3}}"#).unwrap();
    let services = build_coordination(&cfg, Arc::new(DirectRouteOracle)).unwrap();
    assert_eq!(services.search.config().worker_count, 3);
    assert_eq!(services.assignment.channel_capacity, 64);
}

#[test]
fn test_services_share_one_coordinator() {
    let services = build_coordination(&CoordinationConfig::default(), Arc::new(DirectRouteOracle)).unwrap();
    let clone = services.clone();
    clone
        .coordinator
        .register_resource(ResourceLedger::new("BUF-1", "op-1", 10))
        .unwrap();
    assert!(services.coordinator.ledger("BUF-1").is_some());

    let events = services.events.as_ref().unwrap().lock();
    assert_eq!(events.count(CoordinationAction::Registered), 1);
}
