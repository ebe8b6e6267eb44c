//! Error types for coordination operations.

use thiserror::Error;

/// Errors produced by the coordination components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    /// The resource does not have enough free capacity.
    #[error("insufficient space on {resource}: requested {requested}, available {available}")]
    InsufficientSpace {
        /// Resource symbol.
        resource: String,
        /// Units requested.
        requested: u32,
        /// Units currently free.
        available: u32,
    },
    /// The resource does not hold enough of a good right now.
    #[error("insufficient {good} on {resource}: requested {requested}, available {available}")]
    InsufficientCargo {
        /// Resource symbol.
        resource: String,
        /// Good symbol.
        good: String,
        /// Units requested.
        requested: u32,
        /// Units currently available.
        available: u32,
    },
    /// A withdrawal touched more units than were reserved.
    #[error("invalid reservation of {good} on {resource}: requested {requested}, reserved {reserved}")]
    InvalidReservation {
        /// Resource symbol.
        resource: String,
        /// Good symbol.
        good: String,
        /// Units requested.
        requested: u32,
        /// Units currently reserved.
        reserved: u32,
    },
    /// A resource with the same symbol is already registered.
    #[error("resource already registered: {0}")]
    AlreadyRegistered(String),
    /// No resource with this symbol is registered.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    /// The resource a waiter depended on was unregistered.
    #[error("resource gone for operation {0}")]
    ResourceGone(String),
    /// The caller cancelled a wait.
    #[error("wait cancelled")]
    WaitCancelled,
    /// No resources are registered for the operation.
    #[error("operation not found: {0}")]
    OperationNotFound(String),
    /// No candidate site/destination pair is feasible.
    #[error("no feasible candidate: {0}")]
    NoFeasibleCandidate(String),
    /// The operation shut down while a pairing was in flight.
    #[error("operation shut down")]
    OperationShutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The process-lifecycle collaborator failed.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

impl CoordinationError {
    /// Whether the caller may wait or retry with a smaller request.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientSpace { .. } | Self::InsufficientCargo { .. }
        )
    }

    /// Whether the error closes a waiter's result slot for good.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResourceGone(_) | Self::WaitCancelled | Self::OperationShutdown
        )
    }
}

/// Result alias for coordination components.
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
