//! Runtime adapters and API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{describe_operation, health, Health, OperationSnapshot};
pub use tokio_spawner::TokioSpawner;
