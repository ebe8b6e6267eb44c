//! Operation start-up and teardown.
//!
//! A fleet operation picks its site and destination, registers its buffers
//! with the coordinator, runs an assignment loop and starts one worker per
//! planned ship. Anything started is undone if a later step fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::AssignmentConfig;
use crate::core::assignment::{AssignmentHandle, AssignmentStats, WorkAssignmentLoop};
use crate::core::collaborators::{ProcessLifecycle, ShipRepository, Spawn};
use crate::core::coordinator::ResourceCoordinator;
use crate::core::routing::Location;
use crate::core::search_pool::{CandidateSearchPool, CandidateSelection};
use crate::core::{CancelSignal, CoordinationError, CoordinationResult, ResourceLedger};
use crate::util::clock::now_ms;
use crate::util::serde::{OperationId, WorkerId, WorkerKind};

/// A stationary buffer to register for the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPlan {
    /// Buffer symbol, usually the storage ship's.
    pub symbol: String,
    /// Cargo capacity.
    pub capacity: u32,
}

/// A ship to start a worker for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPlan {
    /// Ship symbol.
    pub ship_symbol: String,
    /// Worker role.
    pub kind: WorkerKind,
}

/// Everything needed to start an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPlan {
    /// Operation identifier.
    pub operation_id: OperationId,
    /// Trait a site must carry.
    pub target_trait: String,
    /// Good the operation moves.
    pub good: String,
    /// Ship whose fuel profile bounds the search.
    pub reference_ship: String,
    /// Known locations in the region.
    pub locations: Vec<Location>,
    /// Buffers to register.
    pub buffers: Vec<BufferPlan>,
    /// Workers to start.
    pub workers: Vec<WorkerPlan>,
}

/// Command handed to a started worker, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    /// Operation identifier.
    pub operation_id: OperationId,
    /// Ship the worker drives.
    pub ship_symbol: String,
    /// Worker role.
    pub kind: WorkerKind,
    /// Good the operation moves.
    pub good: String,
    /// Selected site.
    pub site: String,
    /// Selected destination.
    pub destination: String,
    /// Registered buffer symbols.
    pub buffers: Vec<String>,
    /// Issue time (ms since epoch).
    pub issued_at_ms: u128,
}

/// Services an operation is started with.
#[derive(Clone)]
pub struct OperationDeps {
    /// Shared resource coordinator.
    pub coordinator: Arc<ResourceCoordinator>,
    /// Candidate search pool.
    pub search: Arc<CandidateSearchPool>,
    /// Worker lifecycle manager.
    pub lifecycle: Arc<dyn ProcessLifecycle>,
    /// Ship profile source.
    pub ships: Arc<dyn ShipRepository>,
    /// Assignment loop settings.
    pub assignment: AssignmentConfig,
}

/// A running fleet operation.
pub struct FleetOperation {
    operation_id: OperationId,
    selection: CandidateSelection,
    cancel: CancelSignal,
    assignment: AssignmentHandle,
    coordinator: Arc<ResourceCoordinator>,
    lifecycle: Arc<dyn ProcessLifecycle>,
    buffers: Vec<String>,
    workers: Mutex<Vec<WorkerId>>,
    loop_stats: Mutex<Option<oneshot::Receiver<AssignmentStats>>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for FleetOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetOperation")
            .field("operation_id", &self.operation_id)
            .field("site", &self.selection.site)
            .field("destination", &self.selection.destination)
            .field("buffers", &self.buffers)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// What `start` has done so far, for rollback.
struct Started<'a> {
    deps: &'a OperationDeps,
    cancel: CancelSignal,
    buffers: Vec<String>,
    workers: Vec<WorkerId>,
}

impl Started<'_> {
    async fn roll_back(self, operation_id: &str) {
        warn!(operation_id = operation_id, "rolling back operation start");
        self.cancel.cancel();
        stop_all(self.deps.lifecycle.as_ref(), operation_id, &self.workers).await;
        for symbol in &self.buffers {
            let _ = self.deps.coordinator.unregister_resource(symbol);
        }
    }
}

impl FleetOperation {
    /// Start an operation.
    ///
    /// # Errors
    ///
    /// Returns `NoFeasibleCandidate` if the search finds nothing,
    /// `OperationNotFound` if no buffer could be registered, or `Lifecycle` if
    /// a worker fails to start. Everything started before the failure is
    /// stopped and unregistered.
    pub async fn start<S: Spawn>(plan: OperationPlan, deps: &OperationDeps, spawner: &S) -> CoordinationResult<Self> {
        let operation_id = plan.operation_id.clone();
        info!(operation_id = %operation_id, target_trait = %plan.target_trait, "starting operation");

        let ship = deps.ships.fetch_ship(&plan.reference_ship).await?;
        let cancel = CancelSignal::new();
        let selection = {
            let search = Arc::clone(&deps.search);
            let cancel = cancel.clone();
            let target_trait = plan.target_trait.clone();
            let locations = plan.locations.clone();
            tokio::task::spawn_blocking(move || search.select_best_candidate(&target_trait, &ship, &locations, &cancel))
                .await
                .map_err(|e| CoordinationError::Lifecycle(format!("candidate search task failed: {e}")))??
        };
        info!(
            operation_id = %operation_id,
            site = %selection.site,
            destination = %selection.destination,
            feasible = selection.feasible,
            "candidate selected"
        );

        let mut started = Started {
            deps,
            cancel: cancel.clone(),
            buffers: Vec::new(),
            workers: Vec::new(),
        };

        for buffer in &plan.buffers {
            match deps
                .coordinator
                .register_resource(ResourceLedger::new(&buffer.symbol, &operation_id, buffer.capacity))
            {
                Ok(_) => started.buffers.push(buffer.symbol.clone()),
                Err(e) => warn!(operation_id = %operation_id, buffer = %buffer.symbol, error = %e, "buffer not registered"),
            }
        }
        if started.buffers.is_empty() {
            started.roll_back(&operation_id).await;
            return Err(CoordinationError::OperationNotFound(operation_id));
        }

        let (assignment, event_loop) = WorkAssignmentLoop::channel(&operation_id, &deps.assignment, cancel.clone());
        let loop_stats = event_loop.spawn_on(spawner);

        for worker in &plan.workers {
            let command = WorkerCommand {
                operation_id: operation_id.clone(),
                ship_symbol: worker.ship_symbol.clone(),
                kind: worker.kind,
                good: plan.good.clone(),
                site: selection.site.clone(),
                destination: selection.destination.clone(),
                buffers: started.buffers.clone(),
                issued_at_ms: now_ms(),
            };
            let payload = match serde_json::to_string(&command) {
                Ok(payload) => payload,
                Err(e) => {
                    started.roll_back(&operation_id).await;
                    return Err(CoordinationError::Lifecycle(format!("cannot encode worker command: {e}")));
                }
            };
            match deps.lifecycle.start_worker(worker.kind, payload).await {
                Ok(worker_id) => started.workers.push(worker_id),
                Err(e) => {
                    error!(operation_id = %operation_id, ship = %worker.ship_symbol, error = %e, "worker failed to start");
                    started.roll_back(&operation_id).await;
                    return Err(e);
                }
            }
        }

        info!(
            operation_id = %operation_id,
            buffers = started.buffers.len(),
            workers = started.workers.len(),
            "operation started"
        );
        let Started { buffers, workers, .. } = started;
        Ok(Self {
            operation_id,
            selection,
            cancel,
            assignment,
            coordinator: Arc::clone(&deps.coordinator),
            lifecycle: Arc::clone(&deps.lifecycle),
            buffers,
            workers: Mutex::new(workers),
            loop_stats: Mutex::new(Some(loop_stats)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Operation identifier.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// The chosen site and destination.
    #[must_use]
    pub const fn selection(&self) -> &CandidateSelection {
        &self.selection
    }

    /// Handle to the operation's assignment loop.
    #[must_use]
    pub const fn assignment(&self) -> &AssignmentHandle {
        &self.assignment
    }

    /// Signal fired on shutdown; pass it to `wait_for_cargo`.
    #[must_use]
    pub const fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Registered buffer symbols.
    #[must_use]
    pub fn buffers(&self) -> &[String] {
        &self.buffers
    }

    /// Workers started and not yet stopped.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerId> {
        self.workers.lock().clone()
    }

    /// Whether `shutdown` has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop the operation. Later calls return `Ok(None)`.
    ///
    /// Returns the assignment loop's final counters on the first call.
    ///
    /// # Errors
    ///
    /// Returns `Lifecycle` if any worker failed to stop; the rest of the
    /// teardown still runs.
    pub async fn shutdown(&self) -> CoordinationResult<Option<AssignmentStats>> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(None);
        }
        info!(operation_id = %self.operation_id, "shutting down operation");
        self.cancel.cancel();

        let workers = std::mem::take(&mut *self.workers.lock());
        let failures = stop_all(self.lifecycle.as_ref(), &self.operation_id, &workers).await;

        for symbol in &self.buffers {
            if let Err(e) = self.coordinator.unregister_resource(symbol) {
                warn!(operation_id = %self.operation_id, buffer = %symbol, error = %e, "buffer already gone");
            }
        }

        let receiver = self.loop_stats.lock().take();
        let stats = match receiver {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        if let Some(stats) = &stats {
            info!(
                operation_id = %self.operation_id,
                pairings = stats.pairings,
                transfers = stats.transfers,
                "assignment loop stopped"
            );
        }

        if failures > 0 {
            return Err(CoordinationError::Lifecycle(format!(
                "{failures} of {} workers failed to stop",
                workers.len()
            )));
        }
        Ok(stats)
    }
}

async fn stop_all(lifecycle: &dyn ProcessLifecycle, operation_id: &str, workers: &[WorkerId]) -> usize {
    let mut failures = 0;
    for worker_id in workers {
        if let Err(e) = lifecycle.stop_worker(worker_id).await {
            failures += 1;
            error!(operation_id = operation_id, worker_id = %worker_id, error = %e, "worker failed to stop");
        }
    }
    failures
}
