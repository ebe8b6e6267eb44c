//! Builders to construct coordination services from configuration.

pub mod coordination_builder;

pub use coordination_builder::{build_coordination, CoordinationServices};
