//! Coordination primitives: ledgers, the shared coordinator, work assignment
//! and candidate search.

pub mod assignment;
pub mod cancel;
pub mod collaborators;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod observer;
pub mod operation;
pub mod routing;
pub mod search_pool;

pub use assignment::{
    AssignmentChannel, AssignmentEvent, AssignmentHandle, AssignmentStats, ConsumerAssignment, ConsumerRequest,
    ProducerAssignment, ProducerAvailability, TransferCompletion, TransferReceipt, WorkAssignmentLoop,
};
pub use cancel::CancelSignal;
pub use collaborators::{ProcessLifecycle, ShipRepository, Spawn, WorkerInfo};
pub use coordinator::{
    CargoReservation, CoordinatorStats, DepositEvent, DepositSubscription, ResourceCoordinator, SpaceReservation,
};
pub use error::{AppResult, CoordinationError, CoordinationResult};
pub use ledger::{LedgerSnapshot, ResourceLedger};
pub use observer::{
    build_event, CoordinationAction, CoordinationEvent, CoordinationObserver, InMemoryObserver, TracingObserver,
};
pub use operation::{BufferPlan, FleetOperation, OperationDeps, OperationPlan, WorkerCommand, WorkerPlan};
pub use routing::{
    DirectRouteOracle, FlightMode, Location, RoutePlan, RouteRequest, RouteStep, RoutingError, RoutingOracle,
    ShipProfile,
};
pub use search_pool::{
    Candidate, CandidatePair, CandidateSearchPool, CandidateSelection, CandidateStatus, SearchStats,
};
