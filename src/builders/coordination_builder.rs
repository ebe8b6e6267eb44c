//! Builders to construct coordination services from configuration.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{AssignmentConfig, CoordinationConfig};
use crate::core::{
    CandidateSearchPool, CoordinationError, CoordinationResult, InMemoryObserver, OperationDeps, ProcessLifecycle,
    ResourceCoordinator, RoutingOracle, ShipRepository, TracingObserver,
};

/// Shared services every operation in a process is started with.
#[derive(Clone)]
pub struct CoordinationServices {
    /// Resource coordinator.
    pub coordinator: Arc<ResourceCoordinator>,
    /// Candidate search pool.
    pub search: Arc<CandidateSearchPool>,
    /// Assignment loop settings.
    pub assignment: AssignmentConfig,
    /// Recent coordination events, when an event log was configured.
    pub events: Option<Arc<Mutex<InMemoryObserver>>>,
}

impl std::fmt::Debug for CoordinationServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationServices")
            .field("assignment", &self.assignment)
            .field("events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}

impl CoordinationServices {
    /// Bundle the services with the external collaborators for `FleetOperation::start`.
    #[must_use]
    pub fn operation_deps(
        &self,
        lifecycle: Arc<dyn ProcessLifecycle>,
        ships: Arc<dyn ShipRepository>,
    ) -> OperationDeps {
        OperationDeps {
            coordinator: Arc::clone(&self.coordinator),
            search: Arc::clone(&self.search),
            lifecycle,
            ships,
            assignment: self.assignment.clone(),
        }
    }
}

/// Build the coordinator and search pool from configuration.
///
/// A non-zero `observer_capacity` keeps that many recent events in memory;
/// zero forwards events to `tracing` instead.
///
/// # Errors
///
/// Returns `InvalidConfig` if the configuration fails validation.
pub fn build_coordination(
    cfg: &CoordinationConfig,
    oracle: Arc<dyn RoutingOracle>,
) -> CoordinationResult<CoordinationServices> {
    cfg.validate().map_err(CoordinationError::InvalidConfig)?;

    let capacity = cfg.coordinator.observer_capacity;
    let coordinator = ResourceCoordinator::new(cfg.coordinator.clone());
    let (coordinator, events) = if capacity > 0 {
        let events = Arc::new(Mutex::new(InMemoryObserver::new(capacity)));
        (coordinator.with_observer(Box::new(Arc::clone(&events))), Some(events))
    } else {
        (coordinator.with_observer(Box::new(TracingObserver)), None)
    };

    let search = CandidateSearchPool::new(cfg.search.clone(), oracle)?;
    Ok(CoordinationServices {
        coordinator: Arc::new(coordinator),
        search: Arc::new(search),
        assignment: cfg.assignment.clone(),
        events,
    })
}
