//! Process-wide alert manager.
//!
//! This module provides the `AlertManager`, which keeps the driver-side alert
//! registration, the host signal handler and the binding registry consistent.
//!
//! # Protocol
//!
//! Install (explicit code):
//! 1. Arm the dispatcher (register the host handler) if it is not armed yet
//! 2. Arm the code at the host, then register `(address, code)` at the driver
//! 3. Store the binding
//!
//! A failing step undoes the earlier ones in reverse order.
//!
//! Remove:
//! 1. Unregister `(address, code)` at the driver; on failure the binding stays
//! 2. Disarm the code, release its pool slot, unlink the binding
//! 3. Disarm the dispatcher if no binding is left
//!
//! Once the driver has let go of the binding, a host failure in step 2 or 3
//! is reported but does not stop the removal.
//!
//! The dispatcher is armed exactly while the registry is non-empty.

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::{Mutex, Once};

use crate::driver::SmbDriver;
use crate::error::{SmbError, SmbResult};
use crate::session::SessionId;
use crate::signal::{SignalCode, SignalHandler, SignalHost, SignalSlotPool};
use crate::transfer::{AlertCtrl, BlockCode, ControlBlock};

use super::{
    dispatch::AlertDispatcher,
    registry::{AlertBinding, AlertCallback, AlertRegistry},
};

/// State guarded by the manager lock.
struct AlertState {
    registry: AlertRegistry,
    /// Whether the host handler is registered.
    armed: bool,
}

/// Steps of an install that have to be undone on failure.
#[derive(Debug, Default, Clone, Copy)]
struct InstallProgress {
    handler: bool,
    code: bool,
    driver: bool,
}

/// Process-wide registry of alert callbacks.
///
/// All sessions of a process share one manager, since the host delivers
/// notifications to a single process-wide handler.
///
/// # Concurrency
///
/// One lock guards the registry and the arm state. It is held for a whole
/// install or remove sequence and for the lookup part of a dispatch.
/// Callbacks run outside of it. Pool locks are only ever taken while the
/// manager lock is held, never the other way around.
pub struct AlertManager {
    host: Arc<dyn SignalHost>,
    state: Mutex<AlertState>,
    dispatcher: AlertDispatcher,
    next_session: AtomicUsize,
    this: Weak<AlertManager>,
}

impl AlertManager {
    /// Creates a manager delivering through `host`.
    pub fn new(host: Arc<dyn SignalHost>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            host,
            state: Mutex::new(AlertState {
                registry: AlertRegistry::new(),
                armed: false,
            }),
            dispatcher: AlertDispatcher::new(),
            next_session: AtomicUsize::new(1),
            this: this.clone(),
        })
    }

    /// Hands out a new session identifier.
    pub(crate) fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    /// Installs an alert callback for `address` on notification code `code`.
    ///
    /// `slot_pool` is the pool `code` was taken from; it gets the code back
    /// when the binding is removed.
    ///
    /// # Errors
    ///
    /// - [`SmbError::ParamError`] if `address` already has a binding
    /// - [`SmbError::AlertInstallFailed`] if `code` is already bound, or the
    ///   host or the driver refused the registration
    /// - [`SmbError::OutOfMemory`] if the binding cannot be stored
    pub fn install(
        &self,
        driver: &dyn SmbDriver,
        session: SessionId,
        address: u16,
        code: SignalCode,
        callback: AlertCallback,
        slot_pool: Option<Arc<Mutex<SignalSlotPool>>>,
    ) -> SmbResult {
        let binding = AlertBinding {
            address,
            code,
            callback,
            session,
            slot_pool,
        };
        self.install_locked(&mut self.state.lock(), driver, binding)
    }

    /// Installs an alert callback for `address` on a code taken from `pool`.
    ///
    /// Codes are unique process-wide, so pool codes another binding already
    /// holds are skipped. The code goes back to `pool` if the install fails.
    ///
    /// # Errors
    ///
    /// [`SmbError::NoFreeSlot`] if no pool code is free and unbound, otherwise
    /// as for [`install`](Self::install).
    pub fn install_pooled(
        &self,
        driver: &dyn SmbDriver,
        session: SessionId,
        address: u16,
        callback: AlertCallback,
        pool: Arc<Mutex<SignalSlotPool>>,
    ) -> SmbResult<SignalCode> {
        let mut state = self.state.lock();
        let code = pool
            .lock()
            .allocate_where(|code| state.registry.find_by_code(code).is_none())?;

        let binding = AlertBinding {
            address,
            code,
            callback,
            session,
            slot_pool: Some(Arc::clone(&pool)),
        };
        match self.install_locked(&mut state, driver, binding) {
            Ok(()) => Ok(code),
            Err(err) => {
                pool.lock().release(code);
                Err(err)
            }
        }
    }

    fn install_locked(
        &self,
        state: &mut AlertState,
        driver: &dyn SmbDriver,
        binding: AlertBinding,
    ) -> SmbResult {
        let (address, code) = (binding.address, binding.code);

        if state.registry.find_by_address(address).is_some() {
            warn!("Alert for address {:#04x} already installed", address);
            return Err(SmbError::ParamError);
        }
        if let Some(other) = state.registry.find_by_code(code) {
            warn!(
                "{} already bound to address {:#04x}",
                code, other.address
            );
            return Err(SmbError::AlertInstallFailed);
        }

        let mut progress = InstallProgress::default();
        let mut ctrl = AlertCtrl::new(address, code);

        if !state.armed {
            self.arm_dispatcher(state)?;
            progress.handler = true;
        }

        if let Err(err) = self.host.arm(code) {
            warn!("Failed to arm {} for address {:#04x}: {:?}", code, address, err);
            self.rollback(state, driver, &mut ctrl, progress);
            return Err(SmbError::AlertInstallFailed);
        }
        progress.code = true;

        if let Err(err) = driver.set_block(BlockCode::AlertCbInstall, ControlBlock::Alert(&mut ctrl)) {
            warn!(
                "Driver refused alert for address {:#04x} on {}: {}",
                address, code, err
            );
            self.rollback(state, driver, &mut ctrl, progress);
            return Err(SmbError::AlertInstallFailed);
        }
        progress.driver = true;

        if let Err(err) = state.registry.insert(binding) {
            self.rollback(state, driver, &mut ctrl, progress);
            return Err(err);
        }

        debug!(
            "Installed alert for address {:#04x} on {} ({} bindings)",
            address,
            code,
            state.registry.len()
        );
        Ok(())
    }

    /// Removes the alert callback of `address` and hands it back.
    ///
    /// # Errors
    ///
    /// - [`SmbError::ParamError`] if `address` has no binding
    /// - the driver error, unchanged, if the driver refused to unregister;
    ///   the binding stays installed in that case
    /// - [`SmbError::AlertInstallFailed`] if the host failed to disarm the
    ///   code or the handler; the binding is removed anyway, since the driver
    ///   no longer knows it
    pub fn remove(&self, driver: &dyn SmbDriver, address: u16) -> SmbResult<AlertCallback> {
        let (binding, result) = {
            let mut state = self.state.lock();

            let code = match state.registry.find_by_address(address) {
                Some(binding) => binding.code,
                None => {
                    trace!("No alert installed for address {:#04x}", address);
                    return Err(SmbError::ParamError);
                }
            };

            let mut ctrl = AlertCtrl::new(address, code);
            driver.set_block(BlockCode::AlertCbRemove, ControlBlock::Alert(&mut ctrl))?;

            let disarmed = self.host.disarm(code).map_err(|err| {
                warn!("Failed to disarm {} for address {:#04x}: {:?}", code, address, err);
                SmbError::AlertInstallFailed
            });

            let Some(binding) = state.registry.remove(address) else {
                return Err(SmbError::ParamError);
            };
            if let Some(pool) = &binding.slot_pool {
                pool.lock().release(code);
            }

            debug!(
                "Removed alert for address {:#04x} on {} ({} bindings)",
                address,
                code,
                state.registry.len()
            );

            let dispatcher = if state.registry.is_empty() && state.armed {
                self.disarm_dispatcher(&mut state)
            } else {
                Ok(())
            };
            (binding, disarmed.and(dispatcher))
        };

        // The callback may own arbitrary state; release it outside the lock.
        result.map(|()| binding.callback)
    }

    /// Removes every binding installed by `session`, then waits until no
    /// callback is running anymore.
    ///
    /// All bindings are attempted; the first error is returned.
    pub fn release_session(&self, driver: &dyn SmbDriver, session: SessionId) -> SmbResult {
        let addresses = self.state.lock().registry.addresses_for(session);
        let mut result = Ok(());

        for address in addresses {
            if let Err(err) = self.remove(driver, address) {
                warn!(
                    "Failed to remove alert for address {:#04x} of {:?}: {}",
                    address, session, err
                );
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        self.wait_quiescent();
        result
    }

    /// Delivers `code` to its callback.
    ///
    /// This is the process-wide handler registered at the host. A code without
    /// binding is dropped silently; it can arrive while the binding is being
    /// removed.
    pub fn dispatch(&self, code: SignalCode) {
        let delivery = {
            let state = self.state.lock();
            state
                .registry
                .find_by_code(code)
                .map(|b| (b.address, Arc::clone(&b.callback), self.dispatcher.enter()))
        };

        match delivery {
            Some((address, callback, _guard)) => {
                trace!("Dispatching {} to alert of address {:#04x}", code, address);
                callback();
            }
            None => {
                self.dispatcher.record_dropped();
                trace!("No alert bound to {}, dropped", code);
            }
        }
    }

    /// Spins until no alert callback is running.
    pub fn wait_quiescent(&self) {
        self.dispatcher.wait_idle();
    }

    /// Checks whether the host handler is registered.
    pub fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    /// Number of live bindings.
    pub fn binding_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Checks whether `address` has a binding.
    pub fn is_bound(&self, address: u16) -> bool {
        self.state.lock().registry.find_by_address(address).is_some()
    }

    /// Notification code bound to `address`.
    pub fn code_for(&self, address: u16) -> Option<SignalCode> {
        self.state
            .lock()
            .registry
            .find_by_address(address)
            .map(|b| b.code)
    }

    /// Addresses bound by `session`, in installation order.
    pub fn addresses_for(&self, session: SessionId) -> Vec<u16> {
        self.state.lock().registry.addresses_for(session)
    }

    /// Dispatch counters.
    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    /// Registers the process-wide handler at the host.
    fn arm_dispatcher(&self, state: &mut AlertState) -> SmbResult {
        let this = self.this.clone();
        let handler: SignalHandler = Arc::new(move |code| {
            if let Some(manager) = this.upgrade() {
                manager.dispatch(code);
            }
        });

        self.host.register_handler(handler).map_err(|err| {
            warn!("Failed to register alert signal handler: {:?}", err);
            SmbError::AlertInstallFailed
        })?;

        state.armed = true;
        debug!("Alert dispatcher armed");
        Ok(())
    }

    /// Removes the process-wide handler from the host.
    fn disarm_dispatcher(&self, state: &mut AlertState) -> SmbResult {
        self.host.unregister_handler().map_err(|err| {
            warn!("Failed to unregister alert signal handler: {:?}", err);
            SmbError::AlertInstallFailed
        })?;

        state.armed = false;
        debug!("Alert dispatcher disarmed");
        Ok(())
    }

    /// Undoes the completed steps of a failed install, newest first.
    fn rollback(
        &self,
        state: &mut AlertState,
        driver: &dyn SmbDriver,
        ctrl: &mut AlertCtrl,
        progress: InstallProgress,
    ) {
        let code = ctrl.code();

        if progress.driver {
            if let Err(err) = driver.set_block(BlockCode::AlertCbRemove, ControlBlock::Alert(&mut *ctrl)) {
                warn!("Rollback: driver kept alert for address {:#04x}: {}", ctrl.addr, err);
            }
        }
        if progress.code {
            if let Err(err) = self.host.disarm(code) {
                warn!("Rollback: failed to disarm {}: {:?}", code, err);
            }
        }
        if progress.handler {
            let _ = self.disarm_dispatcher(state);
        }
    }
}

static ALERT_MANAGER: Once<Arc<AlertManager>> = Once::new();

/// Initializes the process-wide alert manager.
///
/// The first call creates the manager; later calls return it and drop `host`.
pub fn init_alert_manager(host: Arc<dyn SignalHost>) -> Arc<AlertManager> {
    Arc::clone(ALERT_MANAGER.call_once(|| {
        debug!("Initializing process-wide alert manager");
        AlertManager::new(host)
    }))
}

/// Returns the process-wide alert manager, if it was initialized.
pub fn alert_manager() -> Option<Arc<AlertManager>> {
    ALERT_MANAGER.get().cloned()
}
