//! Alert binding registry.
//!
//! This module provides the table that maps SMBus device addresses to their
//! alert callbacks and notification codes. It is used by the manager to find
//! the binding to remove and by the dispatcher to resolve a delivered code.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

use crate::error::{SmbError, SmbResult};
use crate::session::SessionId;
use crate::signal::{SignalCode, SignalSlotPool};

/// Callback invoked when the bound device raises an alert.
///
/// State the callback needs is captured by the closure.
pub type AlertCallback = Arc<dyn Fn() + Send + Sync>;

/// Association between a device address, its callback and its notification code.
pub struct AlertBinding {
    /// SMBus address of the alerting device.
    pub address: u16,
    /// Notification code the driver raises for this device.
    pub code: SignalCode,
    /// Callback to run on delivery.
    pub callback: AlertCallback,
    /// Session that installed the binding.
    pub session: SessionId,
    /// Pool the code was taken from, `None` for caller-supplied codes.
    pub slot_pool: Option<Arc<Mutex<SignalSlotPool>>>,
}

impl fmt::Debug for AlertBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertBinding")
            .field("address", &self.address)
            .field("code", &self.code)
            .field("session", &self.session)
            .field("pooled", &self.slot_pool.is_some())
            .finish()
    }
}

/// Ordered list of live alert bindings.
///
/// Linear search is used; the number of bindings is bounded by the signal
/// pools. The registry itself is not synchronized, the manager guards it.
#[derive(Debug, Default)]
pub struct AlertRegistry {
    bindings: Vec<AlertBinding>,
}

impl AlertRegistry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Finds the binding for a device address.
    pub fn find_by_address(&self, address: u16) -> Option<&AlertBinding> {
        self.bindings.iter().find(|b| b.address == address)
    }

    /// Finds the binding for a notification code.
    pub fn find_by_code(&self, code: SignalCode) -> Option<&AlertBinding> {
        self.bindings.iter().find(|b| b.code == code)
    }

    /// Makes room for one more binding.
    ///
    /// # Errors
    ///
    /// Returns [`SmbError::OutOfMemory`] if the allocation fails.
    pub fn reserve(&mut self) -> SmbResult {
        self.bindings
            .try_reserve(1)
            .map_err(|_| SmbError::OutOfMemory)
    }

    /// Appends a binding, keeping insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`SmbError::OutOfMemory`] if the binding cannot be stored.
    pub fn insert(&mut self, binding: AlertBinding) -> SmbResult {
        self.reserve()?;
        self.bindings.push(binding);
        Ok(())
    }

    /// Unlinks and returns the binding for `address`.
    ///
    /// The order of the remaining bindings is preserved.
    pub fn remove(&mut self, address: u16) -> Option<AlertBinding> {
        let index = self.bindings.iter().position(|b| b.address == address)?;
        Some(self.bindings.remove(index))
    }

    /// Addresses of all bindings installed by `session`, in insertion order.
    pub fn addresses_for(&self, session: SessionId) -> Vec<u16> {
        self.bindings
            .iter()
            .filter(|b| b.session == session)
            .map(|b| b.address)
            .collect()
    }

    /// Iterates all bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AlertBinding> {
        self.bindings.iter()
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Checks if no binding is live.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(address: u16, code: u32, session: usize) -> AlertBinding {
        AlertBinding {
            address,
            code: SignalCode(code),
            callback: Arc::new(|| {}),
            session: SessionId(session),
            slot_pool: None,
        }
    }

    #[test]
    fn test_registry_insert_and_find() {
        let mut registry = AlertRegistry::new();
        assert!(registry.is_empty());

        registry.insert(binding(0x50, 1, 1)).unwrap();
        registry.insert(binding(0x51, 2, 1)).unwrap();
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.find_by_address(0x51).unwrap().code, SignalCode(2));
        assert_eq!(registry.find_by_code(SignalCode(1)).unwrap().address, 0x50);
        assert!(registry.find_by_address(0x52).is_none());
        assert!(registry.find_by_code(SignalCode(9)).is_none());
    }

    #[test]
    fn test_registry_remove_keeps_neighbours() {
        let mut registry = AlertRegistry::new();
        registry.insert(binding(0x50, 1, 1)).unwrap();
        registry.insert(binding(0x51, 2, 1)).unwrap();
        registry.insert(binding(0x52, 3, 1)).unwrap();

        let removed = registry.remove(0x51).unwrap();
        assert_eq!(removed.code, SignalCode(2));

        let order: Vec<u16> = registry.iter().map(|b| b.address).collect();
        assert_eq!(order, alloc::vec![0x50, 0x52]);
        assert!(registry.remove(0x51).is_none());
    }

    #[test]
    fn test_registry_addresses_for_session() {
        let mut registry = AlertRegistry::new();
        registry.insert(binding(0x50, 1, 1)).unwrap();
        registry.insert(binding(0x60, 2, 2)).unwrap();
        registry.insert(binding(0x51, 3, 1)).unwrap();

        assert_eq!(registry.addresses_for(SessionId(1)), alloc::vec![0x50, 0x51]);
        assert_eq!(registry.addresses_for(SessionId(2)), alloc::vec![0x60]);
        assert!(registry.addresses_for(SessionId(3)).is_empty());
    }
}
