//! Alert callback coordination.
//!
//! SMBus devices signal an alert condition asynchronously. The driver turns an
//! alert of a registered device into a notification code, the host delivers
//! that code to one process-wide handler, and this module routes it to the
//! callback installed for the device.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ install/remove ┌──────────────┐ AlertCbInstall/Remove ┌────────┐
//! │  SmbSession  │───────────────▶│ AlertManager │──────────────────────▶│ driver │
//! │ (slot pool)  │                │  - registry  │                       └───┬────┘
//! └──────────────┘                │  - arm state │ register/arm              │ alert
//!                                 └──────┬───────┘──────────▶┌────────────┐  │
//!                                        │ dispatch(code)    │ SignalHost │◀─┘
//!                                        ◀───────────────────└────────────┘
//!                                        ▼
//!                                  callback()
//! ```
//!
//! The manager registers the host handler when the first binding is
//! installed and unregisters it when the last one is removed.

mod dispatch;
mod manager;
mod registry;

pub use dispatch::{AlertDispatcher, DispatchGuard};
pub use manager::{AlertManager, alert_manager, init_alert_manager};
pub use registry::{AlertBinding, AlertCallback, AlertRegistry};
