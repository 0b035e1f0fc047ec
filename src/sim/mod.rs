//! Simulated driver and signal host.
//!
//! Used by the tests, and usable by callers that want to exercise alert
//! handling without hardware.

mod bus;
mod host;

pub use bus::SimBus;
pub use host::SimSignalHost;
