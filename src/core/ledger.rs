//! Per-resource cargo accounting.
//!
//! A [`ResourceLedger`] tracks one physical buffer: what it holds, how much of
//! that is already promised to a consumer, and how much free space is promised
//! to an in-flight deposit. Every mutator takes the ledger's own lock, so a
//! slow caller on one resource never blocks another resource.
//!
//! Invariants held after every call:
//!
//! - `Σ inventory + reserved_space ≤ capacity`
//! - `reserved_for_withdrawal[good] ≤ inventory[good]`

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::{CoordinationError, CoordinationResult};

/// Point-in-time copy of a ledger's accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Resource symbol.
    pub symbol: String,
    /// Owning operation.
    pub operation_id: String,
    /// Total capacity in units.
    pub capacity: u32,
    /// Units held per good.
    pub inventory: HashMap<String, u32>,
    /// Units promised to consumers per good.
    pub reserved_for_withdrawal: HashMap<String, u32>,
    /// Capacity promised to in-flight deposits.
    pub reserved_space: u32,
}

#[derive(Debug, Default)]
struct LedgerState {
    inventory: HashMap<String, u32>,
    reserved_for_withdrawal: HashMap<String, u32>,
    reserved_space: u32,
}

impl LedgerState {
    fn total_held(&self) -> u32 {
        self.inventory.values().fold(0u32, |sum, units| sum.saturating_add(*units))
    }

    fn available_space(&self, capacity: u32) -> u32 {
        capacity
            .saturating_sub(self.total_held())
            .saturating_sub(self.reserved_space)
    }

    fn held(&self, good: &str) -> u32 {
        self.inventory.get(good).copied().unwrap_or(0)
    }

    fn reserved(&self, good: &str) -> u32 {
        self.reserved_for_withdrawal.get(good).copied().unwrap_or(0)
    }

    fn available_cargo(&self, good: &str) -> u32 {
        self.held(good).saturating_sub(self.reserved(good))
    }

    fn add_inventory(&mut self, good: &str, units: u32) {
        if units == 0 {
            return;
        }
        let held = self.inventory.entry(good.to_string()).or_insert(0);
        *held = held.saturating_add(units);
    }

    fn remove_inventory(&mut self, good: &str, units: u32) {
        if let Some(held) = self.inventory.get_mut(good) {
            *held = held.saturating_sub(units);
            if *held == 0 {
                self.inventory.remove(good);
            }
        }
    }

    fn remove_reservation(&mut self, good: &str, units: u32) {
        if let Some(reserved) = self.reserved_for_withdrawal.get_mut(good) {
            *reserved = reserved.saturating_sub(units);
            if *reserved == 0 {
                self.reserved_for_withdrawal.remove(good);
            }
        }
    }
}

/// Accounting for one storage or transport resource.
#[derive(Debug)]
pub struct ResourceLedger {
    symbol: String,
    operation_id: String,
    capacity: u32,
    state: Mutex<LedgerState>,
}

impl ResourceLedger {
    /// Create an empty ledger.
    pub fn new(symbol: impl Into<String>, operation_id: impl Into<String>, capacity: u32) -> Self {
        Self {
            symbol: symbol.into(),
            operation_id: operation_id.into(),
            capacity,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Create a ledger pre-populated from externally observed cargo, e.g.
    /// after a restart.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientSpace` if the observed cargo exceeds `capacity`.
    pub fn with_inventory<I, S>(
        symbol: impl Into<String>,
        operation_id: impl Into<String>,
        capacity: u32,
        inventory: I,
    ) -> CoordinationResult<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let ledger = Self::new(symbol, operation_id, capacity);
        {
            let mut state = ledger.state.lock();
            // Summed wide so oversized observations are rejected, not wrapped.
            let mut held = 0u64;
            for (good, units) in inventory {
                held += u64::from(units);
                if held > u64::from(capacity) {
                    return Err(CoordinationError::InsufficientSpace {
                        resource: ledger.symbol.clone(),
                        requested: u32::try_from(held).unwrap_or(u32::MAX),
                        available: capacity,
                    });
                }
                state.add_inventory(&good.into(), units);
            }
        }
        Ok(ledger)
    }

    /// Resource symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Operation this resource belongs to.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Total capacity in units.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Capacity not held and not promised to a deposit.
    #[must_use]
    pub fn available_space(&self) -> u32 {
        self.state.lock().available_space(self.capacity)
    }

    /// Units of `good` held and not promised to a consumer.
    #[must_use]
    pub fn available_cargo(&self, good: &str) -> u32 {
        self.state.lock().available_cargo(good)
    }

    /// Units of `good` held, reserved or not.
    #[must_use]
    pub fn inventory(&self, good: &str) -> u32 {
        self.state.lock().held(good)
    }

    /// Units of `good` promised to consumers.
    #[must_use]
    pub fn reserved_for_withdrawal(&self, good: &str) -> u32 {
        self.state.lock().reserved(good)
    }

    /// Capacity promised to in-flight deposits.
    #[must_use]
    pub fn reserved_space(&self) -> u32 {
        self.state.lock().reserved_space
    }

    /// Sum of all held units.
    #[must_use]
    pub fn total_held(&self) -> u32 {
        self.state.lock().total_held()
    }

    /// Goods with a non-zero holding.
    #[must_use]
    pub fn goods(&self) -> Vec<String> {
        self.state.lock().inventory.keys().cloned().collect()
    }

    /// Copy of the full accounting.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock();
        LedgerSnapshot {
            symbol: self.symbol.clone(),
            operation_id: self.operation_id.clone(),
            capacity: self.capacity,
            inventory: state.inventory.clone(),
            reserved_for_withdrawal: state.reserved_for_withdrawal.clone(),
            reserved_space: state.reserved_space,
        }
    }

    /// Promise `units` of free capacity to an in-flight deposit.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientSpace` if fewer than `units` are free.
    pub fn reserve_space(&self, units: u32) -> CoordinationResult<()> {
        let mut state = self.state.lock();
        let available = state.available_space(self.capacity);
        if units > available {
            return Err(self.insufficient_space(units, available));
        }
        state.reserved_space += units;
        Ok(())
    }

    /// Promise as much of `units` as is free and return the granted amount.
    pub fn reserve_space_up_to(&self, units: u32) -> u32 {
        let mut state = self.state.lock();
        let granted = units.min(state.available_space(self.capacity));
        state.reserved_space += granted;
        granted
    }

    /// Give back promised capacity after a deposit failed.
    pub fn release_reserved_space(&self, units: u32) {
        let mut state = self.state.lock();
        state.reserved_space = state.reserved_space.saturating_sub(units);
    }

    /// Turn a space reservation into held cargo once the transfer is confirmed.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientSpace` if the part of `units` not covered by the
    /// reservation does not fit into free capacity.
    pub fn confirm_deposit(&self, good: &str, units: u32) -> CoordinationResult<()> {
        let mut state = self.state.lock();
        let covered = units.min(state.reserved_space);
        let uncovered = units - covered;
        if uncovered > 0 {
            let available = state.available_space(self.capacity);
            if uncovered > available {
                return Err(self.insufficient_space(uncovered, available));
            }
        }
        state.reserved_space -= covered;
        state.add_inventory(good, units);
        Ok(())
    }

    /// Add cargo without a prior space reservation.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientSpace` if fewer than `units` are free.
    pub fn deposit_cargo(&self, good: &str, units: u32) -> CoordinationResult<()> {
        let mut state = self.state.lock();
        let available = state.available_space(self.capacity);
        if units > available {
            return Err(self.insufficient_space(units, available));
        }
        state.add_inventory(good, units);
        Ok(())
    }

    /// Reserve every available unit of `good` if at least `min_units` are
    /// available, otherwise reserve nothing and return 0.
    pub fn try_reserve_cargo(&self, good: &str, min_units: u32) -> u32 {
        let mut state = self.state.lock();
        let available = state.available_cargo(good);
        if available == 0 || available < min_units {
            return 0;
        }
        *state
            .reserved_for_withdrawal
            .entry(good.to_string())
            .or_insert(0) += available;
        available
    }

    /// Remove reserved cargo once the withdrawal is confirmed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReservation` if `units` exceeds the reservation and
    /// `InsufficientCargo` if it exceeds the inventory.
    pub fn confirm_withdrawal(&self, good: &str, units: u32) -> CoordinationResult<()> {
        let mut state = self.state.lock();
        let reserved = state.reserved(good);
        if units > reserved {
            return Err(self.invalid_reservation(good, units, reserved));
        }
        let held = state.held(good);
        if units > held {
            return Err(CoordinationError::InsufficientCargo {
                resource: self.symbol.clone(),
                good: good.to_string(),
                requested: units,
                available: held,
            });
        }
        state.remove_reservation(good, units);
        state.remove_inventory(good, units);
        Ok(())
    }

    /// Release a withdrawal reservation without touching inventory.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReservation` if `units` exceeds the reservation.
    pub fn cancel_reservation(&self, good: &str, units: u32) -> CoordinationResult<()> {
        let mut state = self.state.lock();
        let reserved = state.reserved(good);
        if units > reserved {
            return Err(self.invalid_reservation(good, units, reserved));
        }
        state.remove_reservation(good, units);
        Ok(())
    }

    /// Discard unreserved cargo.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientCargo` if fewer than `units` are held outside of
    /// reservations.
    pub fn jettison_cargo(&self, good: &str, units: u32) -> CoordinationResult<()> {
        let mut state = self.state.lock();
        let available = state.available_cargo(good);
        if units > available {
            return Err(CoordinationError::InsufficientCargo {
                resource: self.symbol.clone(),
                good: good.to_string(),
                requested: units,
                available,
            });
        }
        state.remove_inventory(good, units);
        Ok(())
    }

    fn insufficient_space(&self, requested: u32, available: u32) -> CoordinationError {
        CoordinationError::InsufficientSpace {
            resource: self.symbol.clone(),
            requested,
            available,
        }
    }

    fn invalid_reservation(&self, good: &str, requested: u32, reserved: u32) -> CoordinationError {
        CoordinationError::InvalidReservation {
            resource: self.symbol.clone(),
            good: good.to_string(),
            requested,
            reserved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn assert_invariants(ledger: &ResourceLedger) {
        let snap = ledger.snapshot();
        let held: u32 = snap.inventory.values().sum();
        assert!(held <= snap.capacity);
        assert!(held + snap.reserved_space <= snap.capacity);
        for (good, reserved) in &snap.reserved_for_withdrawal {
            assert!(*reserved <= snap.inventory.get(good).copied().unwrap_or(0));
        }
    }

    #[test]
    fn test_reserve_then_confirm_deposit() {
        let ledger = ResourceLedger::new("HAULER-1", "op1", 100);
        ledger.reserve_space(40).unwrap();
        assert_eq!(ledger.available_space(), 60);

        ledger.confirm_deposit("ORE", 40).unwrap();
        assert_eq!(ledger.inventory("ORE"), 40);
        assert_eq!(ledger.available_space(), 60);
        assert_eq!(ledger.reserved_space(), 0);
        assert_invariants(&ledger);
    }

    #[test]
    fn test_reserve_space_rejects_overcommit() {
        let ledger = ResourceLedger::new("HAULER-1", "op1", 10);
        ledger.reserve_space(8).unwrap();
        let err = ledger.reserve_space(3).unwrap_err();
        assert_eq!(
            err,
            CoordinationError::InsufficientSpace {
                resource: "HAULER-1".into(),
                requested: 3,
                available: 2,
            }
        );
        assert_eq!(ledger.reserve_space_up_to(5), 2);
        assert_eq!(ledger.available_space(), 0);
        assert_invariants(&ledger);
    }

    #[test]
    fn test_release_reserved_space_floors_at_zero() {
        let ledger = ResourceLedger::new("HAULER-1", "op1", 10);
        ledger.reserve_space(4).unwrap();
        ledger.release_reserved_space(9);
        assert_eq!(ledger.reserved_space(), 0);
        assert_eq!(ledger.available_space(), 10);
    }

    #[test]
    fn test_confirm_deposit_beyond_reservation_needs_free_space() {
        let ledger = ResourceLedger::new("HAULER-1", "op1", 10);
        ledger.deposit_cargo("ICE", 6).unwrap();
        ledger.reserve_space(2).unwrap();
        // 2 covered by the reservation, 2 more fit in the remaining space
        ledger.confirm_deposit("ICE", 4).unwrap();
        assert_eq!(ledger.inventory("ICE"), 10);
        assert!(ledger.confirm_deposit("ICE", 1).is_err());
        assert_invariants(&ledger);
    }

    #[test]
    fn test_try_reserve_takes_everything_available() {
        let ledger = ResourceLedger::with_inventory("HAULER-1", "op1", 100, [("ICE", 12)]).unwrap();
        assert_eq!(ledger.try_reserve_cargo("ICE", 20), 0);
        assert_eq!(ledger.try_reserve_cargo("ICE", 5), 12);
        assert_eq!(ledger.available_cargo("ICE"), 0);
        assert_eq!(ledger.try_reserve_cargo("ICE", 1), 0);
        assert_eq!(ledger.try_reserve_cargo("ORE", 0), 0);
        assert_invariants(&ledger);
    }

    #[test]
    fn test_confirm_withdrawal_prunes_entries() {
        let ledger = ResourceLedger::with_inventory("HAULER-1", "op1", 100, [("ICE", 5)]).unwrap();
        assert_eq!(ledger.try_reserve_cargo("ICE", 1), 5);
        ledger.confirm_withdrawal("ICE", 5).unwrap();
        let snap = ledger.snapshot();
        assert!(snap.inventory.is_empty());
        assert!(snap.reserved_for_withdrawal.is_empty());
    }

    #[test]
    fn test_confirm_withdrawal_requires_reservation() {
        let ledger = ResourceLedger::with_inventory("HAULER-1", "op1", 100, [("ICE", 5)]).unwrap();
        assert!(matches!(
            ledger.confirm_withdrawal("ICE", 1),
            Err(CoordinationError::InvalidReservation { reserved: 0, .. })
        ));
        assert!(matches!(
            ledger.confirm_withdrawal("ORE", 1),
            Err(CoordinationError::InvalidReservation { .. })
        ));
    }

    #[test]
    fn test_cancel_reservation_keeps_inventory() {
        let ledger = ResourceLedger::with_inventory("HAULER-1", "op1", 100, [("ICE", 5)]).unwrap();
        ledger.try_reserve_cargo("ICE", 5);
        ledger.cancel_reservation("ICE", 5).unwrap();
        assert_eq!(ledger.inventory("ICE"), 5);
        assert_eq!(ledger.available_cargo("ICE"), 5);
        assert!(ledger.cancel_reservation("ICE", 1).is_err());
    }

    #[test]
    fn test_jettison_only_touches_unreserved_cargo() {
        let ledger = ResourceLedger::with_inventory(
            "HAULER-1",
            "op1",
            100,
            [("ICE", 5), ("SILICON", 3)],
        )
        .unwrap();
        ledger.try_reserve_cargo("ICE", 1);
        assert!(ledger.jettison_cargo("ICE", 1).is_err());
        ledger.jettison_cargo("SILICON", 3).unwrap();
        assert_eq!(ledger.inventory("SILICON"), 0);
        assert_eq!(ledger.inventory("ICE"), 5);
        assert_invariants(&ledger);
    }

    #[test]
    fn test_with_inventory_rejects_overfull() {
        let result = ResourceLedger::with_inventory("HAULER-1", "op1", 10, [("ICE", 8), ("ORE", 3)]);
        assert!(matches!(
            result,
            Err(CoordinationError::InsufficientSpace { requested: 11, .. })
        ));
    }

    #[test]
    fn test_with_inventory_rejects_sum_past_u32() {
        let result = ResourceLedger::with_inventory("HAULER-1", "op1", 10, [("ICE", u32::MAX), ("ORE", 1)]);
        assert!(matches!(
            result,
            Err(CoordinationError::InsufficientSpace { available: 10, .. })
        ));

        let result = ResourceLedger::with_inventory("HAULER-1", "op1", u32::MAX, [("ICE", u32::MAX), ("ICE", 1)]);
        assert!(matches!(
            result,
            Err(CoordinationError::InsufficientSpace {
                requested: u32::MAX,
                ..
            })
        ));
    }

    #[test]
    fn test_concurrent_reserve_single_unit() {
        let ledger = Arc::new(ResourceLedger::with_inventory("HAULER-1", "op1", 10, [("ICE", 1)]).unwrap());
        let barrier = Arc::new(Barrier::new(16));
        let winners = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    barrier.wait();
                    if ledger.try_reserve_cargo("ICE", 1) > 0 {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.reserved_for_withdrawal("ICE"), 1);
    }
}
