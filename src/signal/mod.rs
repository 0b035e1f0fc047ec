//! Notification codes, the per-session slot pool and the host signal interface.
//!
//! Alerts reach user space as small-integer notification codes. The host
//! provides a limited number of them, so every session owns a
//! [`SignalSlotPool`] that hands codes out to alert bindings and takes them
//! back on removal. The [`SignalHost`] trait is the boundary to whatever
//! delivers the codes (POSIX signals, an event loop, a simulation).

mod host;
mod pool;

pub use host::{SignalHandler, SignalHost};
pub use pool::{SignalSlot, SignalSlotPool, SlotState};

/// A notification code routed from the host to the alert dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalCode(pub u32);

impl core::fmt::Display for SignalCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sig#{}", self.0)
    }
}
