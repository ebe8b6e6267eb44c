//! Tests for configuration validation

use std::collections::HashMap;

use fleet_coordination::config::{CoordinationConfig, SearchConfig};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let cfg = CoordinationConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.search.worker_count, 15);
    assert_eq!(cfg.search.destinations_per_site, 5);
    assert_eq!(cfg.coordinator.deposit_buffer, 10);
    assert!(!cfg.search.allow_infeasible);
}

#[test]
fn test_search_config_invalid_workers() {
    let cfg = SearchConfig::new().with_worker_count(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_search_config_invalid_destinations() {
    let cfg = SearchConfig::new().with_destinations_per_site(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_deposit_buffer_rejected() {
    let mut cfg = CoordinationConfig::default();
    cfg.coordinator.deposit_buffer = 0;
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("coordinator:"));
}

#[test]
fn test_from_json_partial() {
    let cfg = CoordinationConfig::from_json_str(r#"{"search": {"worker_count": 4, "allow_infeasible": true}}"#).unwrap();
    assert_eq!(cfg.search.worker_count, 4);
    assert!(cfg.search.allow_infeasible);
    assert_eq!(cfg.search.destinations_per_site, 5);
    assert_eq!(cfg.assignment.channel_capacity, 64);
}

#[test]
fn test_from_json_invalid() {
    assert!(CoordinationConfig::from_json_str("{not json").is_err());
    assert!(CoordinationConfig::from_json_str(r#"{"search": {"worker_count": 0}}"#).is_err());
}

#[test]
fn test_from_lookup_overrides() {
    let cfg = CoordinationConfig::from_lookup(lookup(&[
        ("FLEET_SEARCH_WORKERS", "8"),
        ("FLEET_DEPOSIT_BUFFER", " 32 "),
        ("FLEET_ALLOW_INFEASIBLE", "true"),
    ]))
    .unwrap();
    assert_eq!(cfg.search.worker_count, 8);
    assert_eq!(cfg.coordinator.deposit_buffer, 32);
    assert!(cfg.search.allow_infeasible);
}

#[test]
fn test_from_lookup_bad_value_names_variable() {
    let err = CoordinationConfig::from_lookup(lookup(&[("FLEET_DESTINATIONS_PER_SITE", "many")])).unwrap_err();
    assert!(err.contains("FLEET_DESTINATIONS_PER_SITE"));
}

#[test]
fn test_from_lookup_validates() {
    assert!(CoordinationConfig::from_lookup(lookup(&[("FLEET_ASSIGNMENT_CHANNEL_CAPACITY", "0")])).is_err());
}
