use crate::oasis::AccountAddress;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

/// Set of addresses with a funding request in flight, shared between ingress and the bank.
#[derive(Clone, Default)]
pub struct AddressLockTable {
    in_flight: Arc<Mutex<HashSet<AccountAddress>>>,
}

impl AddressLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashSet<AccountAddress>> {
        // The set stays consistent even if a holder panicked.
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `address` as in flight. Returns true if it already was.
    pub fn acquire(&self, address: &AccountAddress) -> bool {
        !self.entries().insert(address.clone())
    }

    pub fn release(&self, address: &AccountAddress) {
        self.entries().remove(address);
    }

    pub fn is_in_flight(&self, address: &AccountAddress) -> bool {
        self.entries().contains(address)
    }

    pub fn in_flight_count(&self) -> usize {
        self.entries().len()
    }

    /// Acquires `address`, returning a lease that releases it when dropped, or `None` when a
    /// request for it is already in flight.
    pub fn try_lease(&self, address: &AccountAddress) -> Option<AddressLease> {
        if self.acquire(address) {
            return None;
        }
        Some(AddressLease {
            table: self.clone(),
            address: address.clone(),
        })
    }
}

/// Exclusive claim on an address of the lock table.
pub struct AddressLease {
    table: AddressLockTable,
    address: AccountAddress,
}

impl AddressLease {
    pub fn address(&self) -> &AccountAddress {
        &self.address
    }
}

impl Drop for AddressLease {
    fn drop(&mut self) {
        debug!("Releasing in-flight lock of {}", self.address);
        self.table.release(&self.address);
    }
}
