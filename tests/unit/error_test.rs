//! Tests for error types

use fleet_coordination::core::CoordinationError;

#[test]
fn test_insufficient_space_error() {
    let err = CoordinationError::InsufficientSpace {
        resource: "BUF-1".to_string(),
        requested: 15,
        available: 10,
    };
    assert_eq!(format!("{}", err), "insufficient space on BUF-1: requested 15, available 10");
    assert!(err.is_recoverable());
    assert!(!err.is_terminal());
}

#[test]
fn test_insufficient_cargo_error() {
    let err = CoordinationError::InsufficientCargo {
        resource: "BUF-1".to_string(),
        good: "ORE".to_string(),
        requested: 5,
        available: 2,
    };
    assert_eq!(format!("{}", err), "insufficient ORE on BUF-1: requested 5, available 2");
    assert!(err.is_recoverable());
}

#[test]
fn test_invalid_reservation_error() {
    let err = CoordinationError::InvalidReservation {
        resource: "BUF-1".to_string(),
        good: "ORE".to_string(),
        requested: 8,
        reserved: 6,
    };
    assert_eq!(format!("{}", err), "invalid reservation of ORE on BUF-1: requested 8, reserved 6");
    assert!(!err.is_recoverable());
}

#[test]
fn test_terminal_errors() {
    assert!(CoordinationError::ResourceGone("op-1".into()).is_terminal());
    assert!(CoordinationError::WaitCancelled.is_terminal());
    assert!(CoordinationError::OperationShutdown.is_terminal());
    assert!(!CoordinationError::ResourceNotFound("X".into()).is_terminal());
}

#[test]
fn test_simple_messages() {
    assert_eq!(format!("{}", CoordinationError::WaitCancelled), "wait cancelled");
    assert_eq!(
        format!("{}", CoordinationError::OperationNotFound("op-9".into())),
        "operation not found: op-9"
    );
    assert_eq!(
        format!("{}", CoordinationError::AlreadyRegistered("BUF-1".into())),
        "resource already registered: BUF-1"
    );
}

#[test]
fn test_converts_into_anyhow() {
    fn fails() -> fleet_coordination::core::AppResult<()> {
        Err(CoordinationError::Lifecycle("worker crashed".into()))?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert_eq!(err.to_string(), "lifecycle error: worker crashed");
    assert!(err.downcast_ref::<CoordinationError>().is_some());
}
