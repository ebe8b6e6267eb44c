//! Contracts for the services the coordination core runs alongside.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::routing::ShipProfile;
use crate::core::CoordinationResult;
use crate::util::serde::{WorkerId, WorkerKind, WorkerStatus};

/// Abstraction for spawning background work on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// A worker as reported by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Worker identifier.
    pub id: WorkerId,
    /// Worker role.
    pub kind: WorkerKind,
    /// Current state.
    pub status: WorkerStatus,
}

/// Starts and stops worker tasks outside this process.
#[async_trait]
pub trait ProcessLifecycle: Send + Sync {
    /// Start a worker with a serialized command payload.
    ///
    /// # Errors
    ///
    /// Returns `Lifecycle` if the worker could not be started.
    async fn start_worker(&self, kind: WorkerKind, payload: String) -> CoordinationResult<WorkerId>;

    /// Stop a worker.
    ///
    /// # Errors
    ///
    /// Returns `Lifecycle` if the worker could not be stopped.
    async fn stop_worker(&self, worker_id: &str) -> CoordinationResult<()>;

    /// List workers, optionally filtered by kind and status.
    ///
    /// # Errors
    ///
    /// Returns `Lifecycle` if the manager cannot be queried.
    async fn list_workers(
        &self,
        kind: Option<WorkerKind>,
        status: Option<WorkerStatus>,
    ) -> CoordinationResult<Vec<WorkerInfo>>;
}

/// Source of ship fuel and speed figures.
#[async_trait]
pub trait ShipRepository: Send + Sync {
    /// Fetch a ship's current profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the ship is unknown or the repository fails.
    async fn fetch_ship(&self, ship_id: &str) -> CoordinationResult<ShipProfile>;
}
