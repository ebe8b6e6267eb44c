//! Integration tests for FleetOperation start-up and shutdown
//!
//! These tests validate:
//! - Start selects a candidate, registers buffers and starts workers
//! - Worker payloads carry the selection as JSON
//! - Failed starts roll back workers and buffers
//! - Shutdown cancels waiters, stops workers and is idempotent

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_coordination::builders::{build_coordination, CoordinationServices};
use fleet_coordination::config::CoordinationConfig;
use fleet_coordination::core::{
    AssignmentChannel, BufferPlan, CoordinationError, CoordinationResult, DirectRouteOracle, FleetOperation,
    Location, OperationDeps, OperationPlan, ProcessLifecycle, ResourceLedger, ShipProfile, ShipRepository,
    WorkerCommand, WorkerInfo, WorkerPlan,
};
use fleet_coordination::runtime::{describe_operation, health, TokioSpawner};
use fleet_coordination::util::serde::{WorkerKind, WorkerStatus};
use tokio::sync::Mutex;

// ============================================================================
// TEST COLLABORATORS
// ============================================================================

#[derive(Default)]
struct FakeLifecycle {
    workers: Mutex<HashMap<String, (WorkerInfo, String)>>,
    next_id: Mutex<u32>,
    fail_kind: Option<WorkerKind>,
}

impl FakeLifecycle {
    fn failing_on(kind: WorkerKind) -> Self {
        Self {
            fail_kind: Some(kind),
            ..Self::default()
        }
    }

    async fn running(&self) -> usize {
        self.workers
            .lock()
            .await
            .values()
            .filter(|(info, _)| info.status == WorkerStatus::Running)
            .count()
    }

    async fn payloads(&self) -> Vec<WorkerCommand> {
        self.workers
            .lock()
            .await
            .values()
            .map(|(_, payload)| serde_json::from_str(payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl ProcessLifecycle for FakeLifecycle {
    async fn start_worker(&self, kind: WorkerKind, payload: String) -> CoordinationResult<String> {
        if self.fail_kind == Some(kind) {
            return Err(CoordinationError::Lifecycle(format!("cannot start {kind:?}")));
        }
        let mut next = self.next_id.lock().await;
        *next += 1;
        let id = format!("worker-{next}");
        let info = WorkerInfo {
            id: id.clone(),
            kind,
            status: WorkerStatus::Running,
        };
        self.workers.lock().await.insert(id.clone(), (info, payload));
        Ok(id)
    }

    async fn stop_worker(&self, worker_id: &str) -> CoordinationResult<()> {
        match self.workers.lock().await.get_mut(worker_id) {
            Some((info, _)) => {
                info.status = WorkerStatus::Stopped;
                Ok(())
            }
            None => Err(CoordinationError::Lifecycle(format!("unknown worker {worker_id}"))),
        }
    }

    async fn list_workers(
        &self,
        kind: Option<WorkerKind>,
        status: Option<WorkerStatus>,
    ) -> CoordinationResult<Vec<WorkerInfo>> {
        Ok(self
            .workers
            .lock()
            .await
            .values()
            .map(|(info, _)| info.clone())
            .filter(|w| kind.is_none_or(|k| w.kind == k) && status.is_none_or(|s| w.status == s))
            .collect())
    }
}

struct FixedShips;

#[async_trait]
impl ShipRepository for FixedShips {
    async fn fetch_ship(&self, ship_id: &str) -> CoordinationResult<ShipProfile> {
        match ship_id {
            "HAULER-1" => Ok(ShipProfile::full(400, 30)),
            other => Err(CoordinationError::ResourceNotFound(other.to_string())),
        }
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn services() -> CoordinationServices {
    let cfg = CoordinationConfig::from_json_str(r#"{"search": {"worker_count": 2}}"#).unwrap();
    build_coordination(&cfg, Arc::new(DirectRouteOracle)).unwrap()
}

fn plan(operation_id: &str) -> OperationPlan {
    OperationPlan {
        operation_id: operation_id.to_string(),
        target_trait: "ICE".to_string(),
        good: "ICE_WATER".to_string(),
        reference_ship: "HAULER-1".to_string(),
        locations: vec![
            Location::new("ASTEROID-1", 0, 0).with_trait("ICE"),
            Location::new("MARKET-1", 30, 40).as_market(true),
            Location::new("MARKET-FAR", 900, 900).as_market(true),
        ],
        buffers: vec![
            BufferPlan {
                symbol: format!("{operation_id}-STORAGE-1"),
                capacity: 80,
            },
            BufferPlan {
                symbol: format!("{operation_id}-STORAGE-2"),
                capacity: 80,
            },
        ],
        workers: vec![
            WorkerPlan {
                ship_symbol: "MINER-1".to_string(),
                kind: WorkerKind::Extractor,
            },
            WorkerPlan {
                ship_symbol: "HAULER-1".to_string(),
                kind: WorkerKind::Transport,
            },
        ],
    }
}

fn deps(services: &CoordinationServices, lifecycle: &Arc<FakeLifecycle>) -> OperationDeps {
    services.operation_deps(Arc::clone(lifecycle) as Arc<dyn ProcessLifecycle>, Arc::new(FixedShips))
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_start_registers_buffers_and_workers() {
    let services = services();
    let lifecycle = Arc::new(FakeLifecycle::default());
    let spawner = TokioSpawner::current().unwrap();

    let operation = FleetOperation::start(plan("op1"), &deps(&services, &lifecycle), &spawner)
        .await
        .unwrap();

    assert_eq!(operation.selection().site, "ASTEROID-1");
    assert_eq!(operation.selection().destination, "MARKET-1");
    assert!(operation.selection().feasible);
    assert_eq!(services.coordinator.resources_for("op1").len(), 2);
    assert_eq!(operation.workers().len(), 2);
    assert_eq!(lifecycle.running().await, 2);

    let payloads = lifecycle.payloads().await;
    assert!(payloads.iter().all(|p| p.site == "ASTEROID-1" && p.destination == "MARKET-1"));
    assert!(payloads.iter().all(|p| p.buffers.len() == 2 && p.good == "ICE_WATER"));

    let snapshot = describe_operation(&operation, &services.coordinator, lifecycle.as_ref())
        .await
        .unwrap();
    assert_eq!(snapshot.buffers.len(), 2);
    assert_eq!(snapshot.workers.len(), 2);
    assert!(!snapshot.shut_down);

    operation.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_cancels_and_cleans_up() {
    let services = services();
    let lifecycle = Arc::new(FakeLifecycle::default());
    let spawner = TokioSpawner::current().unwrap();
    let operation = Arc::new(
        FleetOperation::start(plan("op2"), &deps(&services, &lifecycle), &spawner)
            .await
            .unwrap(),
    );

    let coordinator = Arc::clone(&services.coordinator);
    let op = Arc::clone(&operation);
    let waiter = tokio::spawn(async move { coordinator.wait_for_cargo("op2", "ICE_WATER", 5, op.cancel_signal()).await });
    let handle = operation.assignment().clone();
    let consumer = tokio::spawn(async move { handle.request_producer("HAULER-1").await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stats = operation.shutdown().await.unwrap().unwrap();
    assert_eq!(stats.queued_consumers, 1);

    assert_eq!(waiter.await.unwrap().unwrap_err(), CoordinationError::WaitCancelled);
    assert_eq!(consumer.await.unwrap().unwrap_err(), CoordinationError::OperationShutdown);
    assert!(services.coordinator.resources_for("op2").is_empty());
    assert_eq!(services.coordinator.stats().queued_waiters, 0);
    assert_eq!(lifecycle.running().await, 0);
    assert!(operation.is_shut_down());

    // Second call is a no-op.
    assert!(operation.shutdown().await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_worker_start_rolls_back() {
    let services = services();
    let lifecycle = Arc::new(FakeLifecycle::failing_on(WorkerKind::Transport));
    let spawner = TokioSpawner::current().unwrap();

    let err = FleetOperation::start(plan("op3"), &deps(&services, &lifecycle), &spawner)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::Lifecycle(_)));

    // The extractor that did start was stopped again.
    assert_eq!(lifecycle.running().await, 0);
    assert_eq!(
        lifecycle
            .list_workers(Some(WorkerKind::Extractor), Some(WorkerStatus::Stopped))
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(services.coordinator.resources_for("op3").is_empty());
}

#[tokio::test]
async fn test_no_registrable_buffer_fails() {
    let services = services();
    let lifecycle = Arc::new(FakeLifecycle::default());
    let spawner = TokioSpawner::current().unwrap();
    for buffer in &plan("op4").buffers {
        services
            .coordinator
            .register_resource(ResourceLedger::new(&buffer.symbol, "someone-else", 10))
            .unwrap();
    }

    let err = FleetOperation::start(plan("op4"), &deps(&services, &lifecycle), &spawner)
        .await
        .unwrap_err();
    assert_eq!(err, CoordinationError::OperationNotFound("op4".into()));
    assert_eq!(lifecycle.running().await, 0);
    // Buffers owned by the other operation are untouched.
    assert_eq!(services.coordinator.resources_for("someone-else").len(), 2);
}

#[tokio::test]
async fn test_unknown_reference_ship_fails_before_anything_starts() {
    let services = services();
    let lifecycle = Arc::new(FakeLifecycle::default());
    let spawner = TokioSpawner::current().unwrap();
    let mut plan = plan("op5");
    plan.reference_ship = "GHOST".to_string();

    let err = FleetOperation::start(plan, &deps(&services, &lifecycle), &spawner)
        .await
        .unwrap_err();
    assert_eq!(err, CoordinationError::ResourceNotFound("GHOST".into()));
    assert!(services.coordinator.resources_for("op5").is_empty());
    assert_eq!(lifecycle.running().await, 0);
}

#[tokio::test]
async fn test_health_reflects_failed_workers() {
    let services = services();
    let lifecycle = Arc::new(FakeLifecycle::default());
    assert!(health(&services.coordinator, lifecycle.as_ref()).await.unwrap().ok);

    let id = lifecycle.start_worker(WorkerKind::Storage, "{}".to_string()).await.unwrap();
    lifecycle.workers.lock().await.get_mut(&id).unwrap().0.status = WorkerStatus::Failed;
    assert!(!health(&services.coordinator, lifecycle.as_ref()).await.unwrap().ok);
}
