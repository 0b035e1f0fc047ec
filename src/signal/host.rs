//! Host notification primitives consumed by the alert subsystem.

use alloc::sync::Arc;

use axerrno::AxResult;

use super::SignalCode;

/// The process-wide handler the host calls for every delivered code.
pub type SignalHandler = Arc<dyn Fn(SignalCode) + Send + Sync>;

/// OS-side signal management.
///
/// There is exactly one handler per process. Individual codes must be armed
/// before the host delivers them and disarmed when their binding goes away.
///
/// Implementations must not call the handler while the caller of one of
/// these methods is blocked in it.
pub trait SignalHost: Send + Sync {
    /// Installs the process-wide handler.
    fn register_handler(&self, handler: SignalHandler) -> AxResult;

    /// Removes the process-wide handler.
    fn unregister_handler(&self) -> AxResult;

    /// Enables delivery of `code`.
    fn arm(&self, code: SignalCode) -> AxResult;

    /// Disables delivery of `code`.
    fn disarm(&self, code: SignalCode) -> AxResult;
}
