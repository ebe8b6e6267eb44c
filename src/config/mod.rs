//! Configuration models for the coordinator, assignment loops and search pool.

pub mod coordination;

pub use coordination::{AssignmentConfig, CoordinationConfig, CoordinatorConfig, SearchConfig};
