#![no_std]

//! # SMB2 Alert Coordination
//!
//! User-space access to SMBus controllers driven by an SMB2 driver, with
//! asynchronous alert callbacks. The crate is `no_std` and uses `alloc`.
//!
//! ## Architecture
//!
//! ### Transfers
//! - [`SmbSession`]: one open path to a controller; SMBus and I2C transfers
//! - [`SmbDriver`]: the driver path a session talks to through control blocks
//! - [`Transfer`], [`TransferBlock`], [`AlertCtrl`], [`I2cMessage`]: control blocks
//!
//! ### Alerts
//! - [`SignalSlotPool`]: per-session pool of notification codes
//! - [`AlertManager`]: process-wide registry of `(address, code, callback)` bindings
//! - [`SignalHost`]: host notification facility the manager arms and disarms
//!
//! The manager keeps the host handler registered exactly while at least one
//! binding exists, and every failed install leaves no trace behind.
//!
//! ## Example
//!
//! ```rust,ignore
//! use smb2_alert::{SessionConfig, SmbFlags, SmbSession, init_alert_manager};
//!
//! let alerts = init_alert_manager(host);
//! let session = SmbSession::open(&opener, "smb2_1", alerts, &SessionConfig::host_default())?;
//!
//! session.write_byte_data(SmbFlags::empty(), 0x50, 0x10, 0xAB)?;
//! let code = session.alert_cb_install(0x50, || {
//!     // runs on the notification context
//! })?;
//!
//! session.alert_cb_remove(0x50)?;
//! session.close()?;
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod alert;
mod config;
mod driver;
mod error;
mod session;
mod signal;
mod transfer;
pub mod sim;

pub use alert::{
    AlertBinding, AlertCallback, AlertDispatcher, AlertManager, AlertRegistry, DispatchGuard,
    alert_manager, init_alert_manager,
};
pub use config::{FIRST_SIGNAL, HOST_SIGNAL_COUNT, MAX_ALERT_SIGNALS, SessionConfig};
pub use driver::{DeviceOpener, SmbDriver};
pub use error::{
    ERR_DEV, ERR_END, SMB_ERR_BASE, SmbError, SmbResult, errstring, errstring_with, is_smb_code,
};
pub use session::{BlockData, SessionId, SmbSession};
pub use signal::{SignalCode, SignalHandler, SignalHost, SignalSlot, SignalSlotPool, SlotState};
pub use transfer::{
    AlertCtrl, BLOCK_MAX_BYTES, BlockCode, ControlBlock, I2cFlags, I2cMessage, ReadWrite, SmbFlags,
    Transfer, TransferBlock,
};

/// Identification string of this library.
pub fn ident() -> &'static str {
    concat!("SMB2 API ", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_names_version() {
        assert!(ident().starts_with("SMB2 API "));
        assert!(ident().ends_with(env!("CARGO_PKG_VERSION")));
    }
}
