//! Observer sinks for coordination state changes.
//!
//! The coordinator calls an injected observer on registration, reservation,
//! queueing and deposit events. Exporting these as metrics is left to the
//! orchestration layer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationAction {
    /// A ledger was registered.
    Registered,
    /// A ledger was unregistered.
    Unregistered,
    /// Cargo was reserved for a consumer.
    CargoReserved,
    /// A consumer joined a waiter queue.
    WaiterQueued,
    /// A queued consumer received a reservation.
    WaiterSatisfied,
    /// A queued consumer cancelled.
    WaiterCancelled,
    /// A queued consumer lost its resource.
    WaiterGone,
    /// Free space was promised to a deposit.
    SpaceReserved,
    /// Cargo was deposited.
    Deposited,
    /// Cargo was withdrawn.
    Withdrawn,
    /// Cargo was discarded.
    Jettisoned,
    /// A deposit notification could not be delivered to a slow subscriber.
    NotificationDropped,
}

/// Coordination event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationEvent {
    /// Operation identifier.
    pub operation_id: String,
    /// Resource symbol, when the event concerns one resource.
    pub resource: Option<String>,
    /// Good symbol, when the event concerns one good.
    pub good: Option<String>,
    /// Units involved.
    pub units: u32,
    /// Action taken.
    pub action: CoordinationAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Observer abstraction.
pub trait CoordinationObserver: Send {
    /// Record a coordination event.
    fn record(&mut self, event: CoordinationEvent);
}

/// In-memory observer for testing and dev.
pub struct InMemoryObserver {
    events: VecDeque<CoordinationEvent>,
    max_events: usize,
}

impl InMemoryObserver {
    /// Create a new in-memory observer with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<CoordinationEvent> {
        self.events.iter().cloned().collect()
    }

    /// Number of stored events carrying `action`.
    #[must_use]
    pub fn count(&self, action: CoordinationAction) -> usize {
        self.events.iter().filter(|e| e.action == action).count()
    }
}

impl CoordinationObserver for InMemoryObserver {
    fn record(&mut self, event: CoordinationEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Shared observer, so a caller can keep reading events after handing a clone
/// to the coordinator.
impl<T: CoordinationObserver> CoordinationObserver for Arc<Mutex<T>> {
    fn record(&mut self, event: CoordinationEvent) {
        self.lock().record(event);
    }
}

/// Observer that forwards events to `tracing` at debug level.
pub struct TracingObserver;

impl CoordinationObserver for TracingObserver {
    fn record(&mut self, event: CoordinationEvent) {
        tracing::debug!(
            operation_id = %event.operation_id,
            resource = ?event.resource,
            good = ?event.good,
            units = event.units,
            action = ?event.action,
            "coordination event"
        );
    }
}

/// Helper to build a coordination event from context.
pub fn build_event(
    operation_id: impl Into<String>,
    resource: Option<&str>,
    good: Option<&str>,
    units: u32,
    action: CoordinationAction,
) -> CoordinationEvent {
    CoordinationEvent {
        operation_id: operation_id.into(),
        resource: resource.map(str::to_string),
        good: good.map(str::to_string),
        units,
        action,
        created_at_ms: now_ms(),
    }
}
