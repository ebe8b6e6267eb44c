//! Process-wide registry of resource ledgers and FIFO cargo waiters.
//!
//! Locking is two-level: one `parking_lot::Mutex` guards the registry
//! (ledgers by symbol and by operation, waiter queues, deposit subscribers),
//! and every [`ResourceLedger`] guards its own accounting. The registry lock is
//! always taken before a ledger lock, never the other way round.
//!
//! Waiters queue per `(operation, good)` and are served strictly in arrival
//! order: queue processing stops at the first waiter that cannot be
//! satisfied, even if a later, smaller request could be.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::core::observer::{build_event, CoordinationAction, CoordinationObserver};
use crate::core::{CancelSignal, CoordinationError, CoordinationResult, ResourceLedger};

/// Cargo reserved for one consumer on one resource.
#[derive(Debug, Clone)]
pub struct CargoReservation {
    /// Resource holding the reserved cargo.
    pub ledger: Arc<ResourceLedger>,
    /// Good reserved.
    pub good: String,
    /// Units reserved. Always at least the requested minimum.
    pub units: u32,
}

/// Free capacity promised to one in-flight deposit.
#[derive(Debug, Clone)]
pub struct SpaceReservation {
    /// Resource whose space was reserved.
    pub ledger: Arc<ResourceLedger>,
    /// Units granted; may be less than requested.
    pub units: u32,
}

/// A confirmed deposit on a subscribed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    /// Resource symbol.
    pub resource: String,
    /// Good deposited.
    pub good: String,
    /// Units deposited.
    pub units: u32,
}

/// Receiving end of a deposit subscription.
///
/// Delivery is best effort: when the buffer is full new notifications are
/// dropped rather than blocking the depositing worker.
#[derive(Debug)]
pub struct DepositSubscription {
    id: Uuid,
    resource: String,
    receiver: mpsc::Receiver<DepositEvent>,
}

impl DepositSubscription {
    /// Subscription identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Subscribed resource symbol.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Wait for the next deposit. Returns `None` once the resource is
    /// unregistered or the subscription removed.
    pub async fn recv(&mut self) -> Option<DepositEvent> {
        self.receiver.recv().await
    }

    /// Take the next buffered deposit without waiting.
    pub fn try_recv(&mut self) -> Option<DepositEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Snapshot of coordinator bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Registered resources.
    pub resources: usize,
    /// Operations with at least one resource.
    pub operations: usize,
    /// Waiters queued across all keys.
    pub queued_waiters: usize,
    /// Live deposit subscriptions.
    pub subscribers: usize,
    /// Deposit notifications dropped because a subscriber was full.
    pub dropped_notifications: u64,
}

type WaitKey = (String, String);
type WaitSlot = oneshot::Sender<CoordinationResult<CargoReservation>>;
type WaitReceiver = oneshot::Receiver<CoordinationResult<CargoReservation>>;

struct Waiter {
    id: u64,
    min_units: u32,
    slot: WaitSlot,
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<DepositEvent>,
}

#[derive(Default)]
struct Registry {
    by_symbol: HashMap<String, Arc<ResourceLedger>>,
    /// Ledgers per operation in registration order.
    by_operation: HashMap<String, Vec<Arc<ResourceLedger>>>,
    waiters: HashMap<WaitKey, VecDeque<Waiter>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    next_waiter_id: u64,
}

/// A queued `wait_for_cargo` call. Unless the outcome was taken, dropping it
/// removes the waiter and returns any cargo already delivered to it.
struct PendingWait<'a> {
    coordinator: &'a ResourceCoordinator,
    operation_id: &'a str,
    good: &'a str,
    waiter_id: u64,
    rx: WaitReceiver,
    settled: bool,
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator
                .abandon_wait(self.operation_id, self.good, self.waiter_id, &mut self.rx);
        }
    }
}

/// Shared meeting point for workers exchanging cargo through buffers.
pub struct ResourceCoordinator {
    config: CoordinatorConfig,
    registry: Mutex<Registry>,
    observer: Option<Mutex<Box<dyn CoordinationObserver>>>,
    dropped_notifications: AtomicU64,
}

impl Default for ResourceCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl ResourceCoordinator {
    /// Create an empty coordinator.
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry::default()),
            observer: None,
            dropped_notifications: AtomicU64::new(0),
        }
    }

    /// Attach an observer called on every state change.
    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn CoordinationObserver>) -> Self {
        self.observer = Some(Mutex::new(observer));
        self
    }

    /// Register a resource and serve any waiters its initial cargo satisfies.
    ///
    /// Waiters may already be queued when a process restarts and consumers
    /// come back before every buffer has been re-registered.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` if the symbol is known.
    pub fn register_resource(&self, ledger: ResourceLedger) -> CoordinationResult<Arc<ResourceLedger>> {
        let ledger = Arc::new(ledger);
        let symbol = ledger.symbol().to_string();
        let operation_id = ledger.operation_id().to_string();

        let mut registry = self.registry.lock();
        if registry.by_symbol.contains_key(&symbol) {
            warn!(resource = %symbol, "resource already registered");
            return Err(CoordinationError::AlreadyRegistered(symbol));
        }
        registry.by_symbol.insert(symbol.clone(), Arc::clone(&ledger));
        registry
            .by_operation
            .entry(operation_id.clone())
            .or_default()
            .push(Arc::clone(&ledger));
        self.record(&operation_id, Some(&symbol), None, ledger.capacity(), CoordinationAction::Registered);

        let mut served = 0;
        for good in ledger.goods() {
            served += self.process_waiter_queue(&mut registry, &operation_id, &good);
        }
        drop(registry);

        info!(
            resource = %symbol,
            operation_id = %operation_id,
            capacity = ledger.capacity(),
            served_waiters = served,
            "resource registered"
        );
        Ok(ledger)
    }

    /// Remove a resource. Every waiter queued on its operation receives
    /// `ResourceGone` and the operation's queues are cleared; deposit
    /// subscriptions on the resource end.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the symbol is unknown.
    pub fn unregister_resource(&self, symbol: &str) -> CoordinationResult<Arc<ResourceLedger>> {
        let mut registry = self.registry.lock();
        let ledger = registry
            .by_symbol
            .remove(symbol)
            .ok_or_else(|| CoordinationError::ResourceNotFound(symbol.to_string()))?;
        let operation_id = ledger.operation_id().to_string();

        let now_empty = registry.by_operation.get_mut(&operation_id).is_some_and(|list| {
            list.retain(|l| l.symbol() != symbol);
            list.is_empty()
        });
        if now_empty {
            registry.by_operation.remove(&operation_id);
        }

        let keys: Vec<WaitKey> = registry
            .waiters
            .keys()
            .filter(|(op, _)| *op == operation_id)
            .cloned()
            .collect();
        let mut evicted = 0;
        for key in keys {
            let Some(queue) = registry.waiters.remove(&key) else {
                continue;
            };
            for waiter in queue {
                evicted += 1;
                let _ = waiter
                    .slot
                    .send(Err(CoordinationError::ResourceGone(operation_id.clone())));
                self.record(&operation_id, Some(symbol), Some(&key.1), waiter.min_units, CoordinationAction::WaiterGone);
            }
        }
        registry.subscribers.remove(symbol);
        drop(registry);

        self.record(&operation_id, Some(symbol), None, 0, CoordinationAction::Unregistered);
        info!(
            resource = %symbol,
            operation_id = %operation_id,
            evicted_waiters = evicted,
            "resource unregistered"
        );
        Ok(ledger)
    }

    /// Reserve at least `min_units` of `good` from any resource of the
    /// operation, waiting in FIFO order if none can supply it now.
    ///
    /// Exactly one outcome is delivered. When `cancel` fires the waiter is
    /// removed and any reservation that raced the cancel is rolled back.
    ///
    /// # Errors
    ///
    /// - `WaitCancelled` if `cancel` fires first
    /// - `ResourceGone` if a resource of the operation is unregistered while
    ///   waiting
    pub async fn wait_for_cargo(
        &self,
        operation_id: &str,
        good: &str,
        min_units: u32,
        cancel: &CancelSignal,
    ) -> CoordinationResult<CargoReservation> {
        if cancel.is_cancelled() {
            return Err(CoordinationError::WaitCancelled);
        }

        let (waiter_id, rx) = {
            let mut registry = self.registry.lock();
            let immediate = registry
                .by_operation
                .get(operation_id)
                .and_then(|resources| Self::reserve_first(resources, good, min_units));
            if let Some(reservation) = immediate {
                self.record(
                    operation_id,
                    Some(reservation.ledger.symbol()),
                    Some(good),
                    reservation.units,
                    CoordinationAction::CargoReserved,
                );
                debug!(
                    operation_id,
                    good,
                    resource = reservation.ledger.symbol(),
                    units = reservation.units,
                    "cargo reserved immediately"
                );
                return Ok(reservation);
            }

            let (tx, rx) = oneshot::channel();
            let id = registry.next_waiter_id;
            registry.next_waiter_id += 1;
            let queue = registry
                .waiters
                .entry((operation_id.to_string(), good.to_string()))
                .or_default();
            queue.push_back(Waiter {
                id,
                min_units,
                slot: tx,
            });
            debug!(operation_id, good, min_units, position = queue.len(), "waiter queued");
            (id, rx)
        };
        self.record(operation_id, None, Some(good), min_units, CoordinationAction::WaiterQueued);

        // Dropping the future at any await point below rolls the wait back.
        let mut pending = PendingWait {
            coordinator: self,
            operation_id,
            good,
            waiter_id,
            rx,
            settled: false,
        };

        // Cancellation wins a tie; a reservation that raced it is rolled back.
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            outcome = &mut pending.rx => Some(outcome),
        };

        match outcome {
            Some(delivered) => {
                pending.settled = true;
                delivered.unwrap_or_else(|_| Err(CoordinationError::ResourceGone(operation_id.to_string())))
            }
            None => {
                drop(pending);
                Err(CoordinationError::WaitCancelled)
            }
        }
    }

    /// Record an unreserved deposit and serve waiters for the good.
    ///
    /// # Errors
    ///
    /// - `ResourceNotFound` if the symbol is unknown
    /// - `InsufficientSpace` if the cargo does not fit
    pub fn notify_deposit(&self, symbol: &str, good: &str, units: u32) -> CoordinationResult<()> {
        let ledger = self.require(symbol)?;
        ledger.deposit_cargo(good, units)?;
        self.record(ledger.operation_id(), Some(symbol), Some(good), units, CoordinationAction::Deposited);

        let mut registry = self.registry.lock();
        self.process_waiter_queue(&mut registry, ledger.operation_id(), good);
        Ok(())
    }

    /// Confirm a deposit made against a space reservation, serve waiters for
    /// the good, and notify deposit subscribers of the resource.
    ///
    /// # Errors
    ///
    /// - `ResourceNotFound` if the symbol is unknown
    /// - `InsufficientSpace` if the unreserved part does not fit
    pub fn confirm_deposit(&self, symbol: &str, good: &str, units: u32) -> CoordinationResult<()> {
        let ledger = self.require(symbol)?;
        ledger.confirm_deposit(good, units)?;
        self.record(ledger.operation_id(), Some(symbol), Some(good), units, CoordinationAction::Deposited);

        let mut registry = self.registry.lock();
        self.process_waiter_queue(&mut registry, ledger.operation_id(), good);

        let event = DepositEvent {
            resource: symbol.to_string(),
            good: good.to_string(),
            units,
        };
        if let Some(subscribers) = registry.subscribers.get_mut(symbol) {
            subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
                    self.record(ledger.operation_id(), Some(symbol), Some(good), units, CoordinationAction::NotificationDropped);
                    debug!(resource = symbol, subscription = %sub.id, "subscriber full, deposit notification dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        }
        Ok(())
    }

    /// Promise free space on the first resource of the operation that has
    /// any, granting up to `units`.
    ///
    /// # Errors
    ///
    /// - `OperationNotFound` if the operation has no resources
    /// - `InsufficientSpace` if every resource is full
    pub fn reserve_space_for_deposit(&self, operation_id: &str, units: u32) -> CoordinationResult<SpaceReservation> {
        let registry = self.registry.lock();
        let resources = registry
            .by_operation
            .get(operation_id)
            .ok_or_else(|| CoordinationError::OperationNotFound(operation_id.to_string()))?;

        for ledger in resources {
            let granted = ledger.reserve_space_up_to(units);
            if granted > 0 {
                self.record(operation_id, Some(ledger.symbol()), None, granted, CoordinationAction::SpaceReserved);
                debug!(operation_id, resource = ledger.symbol(), requested = units, granted, "space reserved");
                return Ok(SpaceReservation {
                    ledger: Arc::clone(ledger),
                    units: granted,
                });
            }
        }
        Err(CoordinationError::InsufficientSpace {
            resource: operation_id.to_string(),
            requested: units,
            available: 0,
        })
    }

    /// Sum of unreserved `good` across the operation's resources.
    #[must_use]
    pub fn total_available_cargo(&self, operation_id: &str, good: &str) -> u32 {
        let registry = self.registry.lock();
        registry
            .by_operation
            .get(operation_id)
            .map_or(0, |resources| resources.iter().map(|l| l.available_cargo(good)).sum())
    }

    /// First resource of the operation with at least `min_space` free.
    #[must_use]
    pub fn find_resource_with_space(&self, operation_id: &str, min_space: u32) -> Option<Arc<ResourceLedger>> {
        let registry = self.registry.lock();
        registry
            .by_operation
            .get(operation_id)?
            .iter()
            .find(|l| l.available_space() >= min_space)
            .cloned()
    }

    /// Receive confirmed deposits for one resource without polling.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the symbol is unknown.
    pub fn subscribe_to_deposits(&self, symbol: &str) -> CoordinationResult<DepositSubscription> {
        let mut registry = self.registry.lock();
        if !registry.by_symbol.contains_key(symbol) {
            return Err(CoordinationError::ResourceNotFound(symbol.to_string()));
        }
        let (tx, receiver) = mpsc::channel(self.config.deposit_buffer);
        let id = Uuid::new_v4();
        registry
            .subscribers
            .entry(symbol.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        debug!(resource = symbol, subscription = %id, "deposit subscription added");
        Ok(DepositSubscription {
            id,
            resource: symbol.to_string(),
            receiver,
        })
    }

    /// Remove a deposit subscription. Returns whether it was still active.
    pub fn unsubscribe_deposits(&self, subscription: &DepositSubscription) -> bool {
        let mut registry = self.registry.lock();
        let Some(subscribers) = registry.subscribers.get_mut(&subscription.resource) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.id != subscription.id);
        let removed = subscribers.len() < before;
        if subscribers.is_empty() {
            registry.subscribers.remove(&subscription.resource);
        }
        removed
    }

    /// Remove reserved cargo from a resource once the transfer is confirmed.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound`, or the ledger's validation error.
    pub fn confirm_withdrawal(&self, symbol: &str, good: &str, units: u32) -> CoordinationResult<()> {
        let ledger = self.require(symbol)?;
        ledger.confirm_withdrawal(good, units)?;
        self.record(ledger.operation_id(), Some(symbol), Some(good), units, CoordinationAction::Withdrawn);
        Ok(())
    }

    /// Release a withdrawal reservation after an aborted transfer and serve
    /// waiters the freed cargo now satisfies.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound`, or `InvalidReservation` from the ledger.
    pub fn cancel_reservation(&self, symbol: &str, good: &str, units: u32) -> CoordinationResult<()> {
        let ledger = self.require(symbol)?;
        ledger.cancel_reservation(good, units)?;
        let mut registry = self.registry.lock();
        self.process_waiter_queue(&mut registry, ledger.operation_id(), good);
        Ok(())
    }

    /// Give back promised space after a failed deposit.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the symbol is unknown.
    pub fn release_reserved_space(&self, symbol: &str, units: u32) -> CoordinationResult<()> {
        self.require(symbol)?.release_reserved_space(units);
        Ok(())
    }

    /// Discard unreserved cargo.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound`, or `InsufficientCargo` from the ledger.
    pub fn jettison_cargo(&self, symbol: &str, good: &str, units: u32) -> CoordinationResult<()> {
        let ledger = self.require(symbol)?;
        ledger.jettison_cargo(good, units)?;
        self.record(ledger.operation_id(), Some(symbol), Some(good), units, CoordinationAction::Jettisoned);
        Ok(())
    }

    /// Look up a registered resource.
    #[must_use]
    pub fn ledger(&self, symbol: &str) -> Option<Arc<ResourceLedger>> {
        self.registry.lock().by_symbol.get(symbol).cloned()
    }

    /// Resources of an operation in registration order.
    #[must_use]
    pub fn resources_for(&self, operation_id: &str) -> Vec<Arc<ResourceLedger>> {
        self.registry
            .lock()
            .by_operation
            .get(operation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Waiters queued for `(operation, good)`.
    #[must_use]
    pub fn queued_waiters(&self, operation_id: &str, good: &str) -> usize {
        self.registry
            .lock()
            .waiters
            .get(&(operation_id.to_string(), good.to_string()))
            .map_or(0, VecDeque::len)
    }

    /// Current bookkeeping counts.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        let registry = self.registry.lock();
        CoordinatorStats {
            resources: registry.by_symbol.len(),
            operations: registry.by_operation.len(),
            queued_waiters: registry.waiters.values().map(VecDeque::len).sum(),
            subscribers: registry.subscribers.values().map(Vec::len).sum(),
            dropped_notifications: self.dropped_notifications.load(Ordering::Relaxed),
        }
    }

    fn require(&self, symbol: &str) -> CoordinationResult<Arc<ResourceLedger>> {
        self.ledger(symbol)
            .ok_or_else(|| CoordinationError::ResourceNotFound(symbol.to_string()))
    }

    /// Reserve from the first resource, in registration order, that can
    /// supply at least `min_units`.
    fn reserve_first(resources: &[Arc<ResourceLedger>], good: &str, min_units: u32) -> Option<CargoReservation> {
        resources.iter().find_map(|ledger| {
            let units = ledger.try_reserve_cargo(good, min_units);
            (units > 0).then(|| CargoReservation {
                ledger: Arc::clone(ledger),
                good: good.to_string(),
                units,
            })
        })
    }

    /// Serve the `(operation, good)` queue head-first, stopping at the first
    /// waiter that cannot be satisfied. Returns the number served.
    fn process_waiter_queue(&self, registry: &mut Registry, operation_id: &str, good: &str) -> usize {
        let key = (operation_id.to_string(), good.to_string());
        let Some(queue) = registry.waiters.get_mut(&key) else {
            return 0;
        };
        let resources = registry
            .by_operation
            .get(operation_id)
            .map_or(&[][..], Vec::as_slice);

        let mut served = 0;
        while let Some(waiter) = queue.pop_front() {
            if waiter.slot.is_closed() {
                debug!(operation_id, good, waiter = waiter.id, "discarding abandoned waiter");
                continue;
            }
            let Some(reservation) = Self::reserve_first(resources, good, waiter.min_units) else {
                queue.push_front(waiter);
                break;
            };
            let resource = reservation.ledger.symbol().to_string();
            let units = reservation.units;
            match waiter.slot.send(Ok(reservation)) {
                Ok(()) => {
                    served += 1;
                    self.record(operation_id, Some(&resource), Some(good), units, CoordinationAction::WaiterSatisfied);
                    debug!(operation_id, good, resource = %resource, units, waiter = waiter.id, "waiter satisfied");
                }
                Err(Ok(returned)) => {
                    if let Err(e) = returned.ledger.cancel_reservation(good, returned.units) {
                        error!(error = %e, resource = %resource, "failed to roll back reservation for abandoned waiter");
                    }
                }
                Err(Err(_)) => {}
            }
        }
        if queue.is_empty() {
            registry.waiters.remove(&key);
        }
        served
    }

    /// Drop a cancelled or abandoned waiter. If a reservation was delivered
    /// before the waiter could be removed, give the cargo back.
    fn abandon_wait(&self, operation_id: &str, good: &str, waiter_id: u64, rx: &mut WaitReceiver) {
        let key = (operation_id.to_string(), good.to_string());
        let mut registry = self.registry.lock();
        let mut removed = false;
        if let Some(queue) = registry.waiters.get_mut(&key) {
            if let Some(pos) = queue.iter().position(|w| w.id == waiter_id) {
                queue.remove(pos);
                removed = true;
            }
            if queue.is_empty() {
                registry.waiters.remove(&key);
            }
        }

        if !removed {
            if let Ok(Ok(reservation)) = rx.try_recv() {
                if let Err(e) = reservation.ledger.cancel_reservation(good, reservation.units) {
                    error!(error = %e, resource = reservation.ledger.symbol(), "failed to roll back cancelled reservation");
                }
                self.process_waiter_queue(&mut registry, operation_id, good);
            }
        }
        drop(registry);

        self.record(operation_id, None, Some(good), 0, CoordinationAction::WaiterCancelled);
        debug!(operation_id, good, waiter = waiter_id, "wait cancelled");
    }

    fn record(&self, operation_id: &str, resource: Option<&str>, good: Option<&str>, units: u32, action: CoordinationAction) {
        if let Some(observer) = &self.observer {
            observer
                .lock()
                .record(build_event(operation_id, resource, good, units, action));
        }
    }
}
