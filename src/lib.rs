//! # Fleet Coordination
//!
//! Coordination core for fleets of autonomous workers that extract, buffer and
//! haul goods between locations.
//!
//! Many workers compete for the same finite cargo and cargo space held in
//! stationary buffers. This crate keeps that shared accounting consistent and
//! pairs the workers that need each other, without any worker seeing a
//! half-applied reservation.
//!
//! ## Key Features
//!
//! - **Resource Ledgers**: Per-buffer accounting of inventory, reserved cargo and
//!   reserved space, with the capacity invariant enforced on every mutation
//! - **Resource Coordinator**: Process-wide registry with FIFO waiter queues,
//!   cancellable waits and bounded deposit notifications
//! - **Work Assignment Loop**: A single task per operation that pairs consumers
//!   with the best-stocked idle producer and relays transfer receipts
//! - **Candidate Search Pool**: Evaluator threads that pick the closest site and
//!   destination whose round trip fits in the ship's fuel tank
//!
//! ## Waiting for Cargo
//!
//! ```rust,ignore
//! use fleet_coordination::core::{CancelSignal, ResourceCoordinator, ResourceLedger};
//!
//! let coordinator = ResourceCoordinator::default();
//! coordinator.register_resource(ResourceLedger::new("BUF-1", "op-1", 100))?;
//!
//! let cancel = CancelSignal::new();
//! let reservation = coordinator.wait_for_cargo("op-1", "ORE", 10, &cancel).await?;
//! // ... move the cargo, then
//! coordinator.confirm_withdrawal(reservation.ledger.symbol(), "ORE", reservation.units)?;
//! ```
//!
//! ## Starting an Operation
//!
//! ```rust,ignore
//! use fleet_coordination::builders::build_coordination;
//! use fleet_coordination::config::CoordinationConfig;
//! use fleet_coordination::core::FleetOperation;
//! use fleet_coordination::runtime::TokioSpawner;
//!
//! let services = build_coordination(&CoordinationConfig::from_env()?, oracle)?;
//! let deps = services.operation_deps(lifecycle, ships);
//! let operation = FleetOperation::start(plan, &deps, &TokioSpawner::current()?).await?;
//! // ...
//! operation.shutdown().await?;
//! ```
//!
//! For complete examples, see the integration tests under `tests/`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Coordination primitives: ledgers, coordinator, assignment and search.
pub mod core;
/// Configuration models for the coordinator, assignment loops and search pool.
pub mod config;
/// Builders to construct coordination services from configuration.
pub mod builders;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
