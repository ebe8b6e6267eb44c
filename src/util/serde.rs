//! Serializable identifiers shared across components.

use serde::{Deserialize, Serialize};

/// Identifier of a fleet operation.
pub type OperationId = String;

/// Identifier of a worker task, as issued by the process-lifecycle manager.
pub type WorkerId = String;

/// Role of a fleet worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Extracts cargo at a site and hands it to transports.
    Extractor,
    /// Carries cargo from a site to a destination.
    Transport,
    /// Stationary buffer that holds cargo at a site.
    Storage,
}

/// Lifecycle state of a worker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// The worker is running.
    Running,
    /// The worker was stopped.
    Stopped,
    /// The worker exited with an error.
    Failed,
}
