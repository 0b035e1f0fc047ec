//! In-flight tracking and counters for alert dispatch.
//!
//! Dispatch resolves a code under the manager lock but runs the callback
//! outside of it. The dispatcher counts callbacks that are still running so
//! session teardown can wait until none of its callbacks can fire anymore.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Dispatch bookkeeping shared by all deliveries.
#[derive(Debug, Default)]
pub struct AlertDispatcher {
    /// Callbacks currently executing.
    in_flight: AtomicUsize,
    /// Deliveries that reached a callback.
    delivered: AtomicU64,
    /// Deliveries without a matching binding.
    dropped: AtomicU64,
}

impl AlertDispatcher {
    /// Creates a dispatcher with zeroed counters.
    pub const fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Marks a callback as running until the guard is dropped.
    ///
    /// Must be called while the binding is still known to be live, i.e. with
    /// the manager lock held.
    #[inline]
    pub fn enter(&self) -> DispatchGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        DispatchGuard { dispatcher: self }
    }

    /// Records a delivery for a code without binding.
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of callbacks currently running.
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Total number of deliveries that invoked a callback.
    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Total number of deliveries that were dropped.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Spins until no callback is running.
    pub fn wait_idle(&self) {
        while self.in_flight() != 0 {
            core::hint::spin_loop();
        }
    }
}

/// Keeps a dispatch accounted as in flight.
pub struct DispatchGuard<'a> {
    dispatcher: &'a AlertDispatcher,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
