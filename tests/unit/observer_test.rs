//! Tests for coordination observers

use std::sync::Arc;

use fleet_coordination::core::{
    build_event, CancelSignal, CoordinationAction, CoordinationObserver, InMemoryObserver, ResourceCoordinator,
    ResourceLedger,
};
use parking_lot::Mutex;

#[test]
fn test_in_memory_observer_is_bounded() {
    let mut observer = InMemoryObserver::new(2);
    observer.record(build_event("op-1", Some("A"), None, 1, CoordinationAction::Registered));
    observer.record(build_event("op-1", Some("A"), Some("ORE"), 5, CoordinationAction::Deposited));
    observer.record(build_event("op-1", Some("A"), Some("ORE"), 3, CoordinationAction::Withdrawn));

    let events = observer.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, CoordinationAction::Deposited);
    assert_eq!(events[1].units, 3);
}

#[test]
fn test_zero_capacity_keeps_nothing() {
    let mut observer = InMemoryObserver::new(0);
    observer.record(build_event("op-1", None, None, 0, CoordinationAction::Registered));
    assert!(observer.events().is_empty());
}

#[test]
fn test_build_event_fields() {
    let event = build_event("op-7", Some("BUF"), Some("ICE"), 12, CoordinationAction::CargoReserved);
    assert_eq!(event.operation_id, "op-7");
    assert_eq!(event.resource.as_deref(), Some("BUF"));
    assert_eq!(event.good.as_deref(), Some("ICE"));
    assert!(event.created_at_ms > 0);
}

#[tokio::test]
async fn test_coordinator_reports_to_shared_observer() {
    let events = Arc::new(Mutex::new(InMemoryObserver::new(64)));
    let coordinator = ResourceCoordinator::default().with_observer(Box::new(Arc::clone(&events)));

    coordinator
        .register_resource(ResourceLedger::with_inventory("A", "op-1", 50, [("ORE", 20)]).unwrap())
        .unwrap();
    let reservation = coordinator
        .wait_for_cargo("op-1", "ORE", 5, &CancelSignal::new())
        .await
        .unwrap();
    coordinator.confirm_withdrawal("A", "ORE", reservation.units).unwrap();

    let log = events.lock();
    assert_eq!(log.count(CoordinationAction::Registered), 1);
    assert_eq!(log.count(CoordinationAction::CargoReserved), 1);
    assert_eq!(log.count(CoordinationAction::Withdrawn), 1);
}
