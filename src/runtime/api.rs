//! API-facing snapshot models for running operations.

use serde::{Deserialize, Serialize};

use crate::core::{
    CandidateSelection, CoordinationResult, CoordinatorStats, FleetOperation, LedgerSnapshot, ProcessLifecycle,
    ResourceCoordinator, WorkerInfo,
};
use crate::util::serde::{OperationId, WorkerStatus};

/// Point-in-time view of one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSnapshot {
    /// Operation identifier.
    pub operation_id: OperationId,
    /// Chosen site and destination.
    pub selection: CandidateSelection,
    /// Current state of each registered buffer.
    pub buffers: Vec<LedgerSnapshot>,
    /// The operation's workers as reported by the lifecycle manager.
    pub workers: Vec<WorkerInfo>,
    /// Whether shutdown has run.
    pub shut_down: bool,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Coordinator counters.
    pub coordinator: CoordinatorStats,
}

/// Describe an operation. Workers are listed through the lifecycle manager
/// and filtered to the ones this operation started.
///
/// # Errors
///
/// Returns `Lifecycle` if the worker listing fails.
pub async fn describe_operation(
    operation: &FleetOperation,
    coordinator: &ResourceCoordinator,
    lifecycle: &dyn ProcessLifecycle,
) -> CoordinationResult<OperationSnapshot> {
    let own = operation.workers();
    let workers = lifecycle
        .list_workers(None, None)
        .await?
        .into_iter()
        .filter(|w| own.contains(&w.id))
        .collect();
    let buffers = coordinator
        .resources_for(operation.operation_id())
        .iter()
        .map(|ledger| ledger.snapshot())
        .collect();
    Ok(OperationSnapshot {
        operation_id: operation.operation_id().to_string(),
        selection: operation.selection().clone(),
        buffers,
        workers,
        shut_down: operation.is_shut_down(),
    })
}

/// Report coordinator health; unhealthy once any running worker has failed.
///
/// # Errors
///
/// Returns `Lifecycle` if the worker listing fails.
pub async fn health(coordinator: &ResourceCoordinator, lifecycle: &dyn ProcessLifecycle) -> CoordinationResult<Health> {
    let failed = lifecycle.list_workers(None, Some(WorkerStatus::Failed)).await?;
    Ok(Health {
        ok: failed.is_empty(),
        coordinator: coordinator.stats(),
    })
}
