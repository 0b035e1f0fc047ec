//! Fixed-capacity pool of alert signal slots.

use arrayvec::ArrayVec;

use crate::config::{MAX_ALERT_SIGNALS, SessionConfig};
use crate::error::{SmbError, SmbResult};

use super::SignalCode;

/// Usage state of a signal slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Available for a new alert binding.
    Free,
    /// Held by a live alert binding.
    Used,
}

/// One notification code owned by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSlot {
    /// The notification code, unique within the pool.
    pub code: SignalCode,
    /// Current usage state.
    pub state: SlotState,
}

/// Per-session pool of notification codes.
///
/// The pool is not synchronized. Sessions keep it behind a lock and alert
/// bindings hold a reference to it so removal can return the code.
#[derive(Debug, Clone)]
pub struct SignalSlotPool {
    slots: ArrayVec<SignalSlot, MAX_ALERT_SIGNALS>,
}

impl SignalSlotPool {
    /// Creates a pool with all slots free.
    pub fn new(config: &SessionConfig) -> Self {
        let slots = config
            .signal_codes()
            .take(MAX_ALERT_SIGNALS)
            .map(|code| SignalSlot {
                code,
                state: SlotState::Free,
            })
            .collect();
        Self { slots }
    }

    /// Takes the first free slot in pool order.
    ///
    /// # Errors
    ///
    /// Returns [`SmbError::NoFreeSlot`] if every slot is in use.
    pub fn allocate(&mut self) -> SmbResult<SignalCode> {
        self.allocate_where(|_| true)
    }

    /// Takes the first free slot whose code passes `usable`.
    ///
    /// # Errors
    ///
    /// Returns [`SmbError::NoFreeSlot`] if no free slot qualifies.
    pub fn allocate_where<F>(&mut self, mut usable: F) -> SmbResult<SignalCode>
    where
        F: FnMut(SignalCode) -> bool,
    {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.state == SlotState::Free && usable(slot.code))
            .ok_or(SmbError::NoFreeSlot)?;
        slot.state = SlotState::Used;
        Ok(slot.code)
    }

    /// Takes the slot holding `code`, if it belongs to this pool and is free.
    pub fn claim(&mut self, code: SignalCode) -> bool {
        match self
            .slots
            .iter_mut()
            .find(|slot| slot.code == code && slot.state == SlotState::Free)
        {
            Some(slot) => {
                slot.state = SlotState::Used;
                true
            }
            None => false,
        }
    }

    /// Marks the slot holding `code` free again.
    ///
    /// Returns `false` if `code` does not belong to this pool.
    pub fn release(&mut self, code: SignalCode) -> bool {
        match self.slots.iter_mut().find(|slot| slot.code == code) {
            Some(slot) => {
                slot.state = SlotState::Free;
                true
            }
            None => {
                trace!("{} is not a pool signal, nothing to release", code);
                false
            }
        }
    }

    /// Checks whether `code` belongs to this pool.
    pub fn contains(&self, code: SignalCode) -> bool {
        self.slots.iter().any(|slot| slot.code == code)
    }

    /// Checks whether `code` is currently handed out.
    pub fn is_used(&self, code: SignalCode) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.code == code && slot.state == SlotState::Used)
    }

    /// Number of slots in use.
    pub fn used_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Used)
            .count()
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the slots in pool order.
    pub fn slots(&self) -> &[SignalSlot] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(count: usize) -> SignalSlotPool {
        SignalSlotPool::new(&SessionConfig::new(SignalCode(1), count))
    }

    #[test]
    fn test_pool_allocates_in_order() {
        let mut pool = pool(3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.allocate().unwrap(), SignalCode(1));
        assert_eq!(pool.allocate().unwrap(), SignalCode(2));
        assert_eq!(pool.used_count(), 2);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = pool(1);
        pool.allocate().unwrap();
        assert_eq!(pool.allocate(), Err(SmbError::NoFreeSlot));
        assert_eq!(pool.used_count(), 1);
    }

    #[test]
    fn test_pool_release_reuses_first_free() {
        let mut pool = pool(3);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert!(pool.release(a));
        assert!(pool.is_used(b));
        assert!(!pool.is_used(a));
        assert_eq!(pool.allocate().unwrap(), a);
    }

    #[test]
    fn test_pool_release_foreign_code() {
        let mut pool = pool(2);
        pool.allocate().unwrap();
        assert!(!pool.contains(SignalCode(40)));
        assert!(!pool.release(SignalCode(40)));
        assert_eq!(pool.used_count(), 1);
    }

    #[test]
    fn test_pool_claim_specific_code() {
        let mut pool = pool(3);
        assert!(pool.claim(SignalCode(2)));
        assert!(!pool.claim(SignalCode(2)));
        assert!(!pool.claim(SignalCode(7)));
        assert_eq!(pool.allocate().unwrap(), SignalCode(1));
        assert_eq!(pool.allocate().unwrap(), SignalCode(3));
    }

    #[test]
    fn test_pool_allocate_skips_unusable_codes() {
        let mut pool = pool(3);
        let taken = [SignalCode(1), SignalCode(3)];
        assert_eq!(
            pool.allocate_where(|code| !taken.contains(&code)).unwrap(),
            SignalCode(2)
        );
        assert_eq!(
            pool.allocate_where(|code| !taken.contains(&code)),
            Err(SmbError::NoFreeSlot)
        );
        assert_eq!(pool.used_count(), 1);
    }

    #[test]
    fn test_pool_empty_config() {
        let mut pool = pool(0);
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.allocate(), Err(SmbError::NoFreeSlot));
    }
}
