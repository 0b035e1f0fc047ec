//! In-memory signal host.

use alloc::collections::BTreeSet;
use core::sync::atomic::{AtomicUsize, Ordering};

use axerrno::{AxError, AxResult, ax_err};
use spin::Mutex;

use crate::signal::{SignalCode, SignalHandler, SignalHost};

#[derive(Default)]
struct HostState {
    handler: Option<SignalHandler>,
    armed: BTreeSet<SignalCode>,
    fail_register: Option<AxError>,
    fail_arm: Option<AxError>,
    fail_disarm: Option<AxError>,
}

/// Signal host that delivers notifications on [`SimSignalHost::raise`].
///
/// Each `fail_next_*` call makes the next matching host operation fail once.
#[derive(Default)]
pub struct SimSignalHost {
    state: Mutex<HostState>,
    installs: AtomicUsize,
    removals: AtomicUsize,
}

impl SimSignalHost {
    /// Creates a host with no handler and nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `code` to the registered handler, on the calling thread.
    ///
    /// Returns `false` if the code is not armed or no handler is registered.
    pub fn raise(&self, code: SignalCode) -> bool {
        let handler = {
            let state = self.state.lock();
            if !state.armed.contains(&code) {
                return false;
            }
            match &state.handler {
                Some(handler) => handler.clone(),
                None => return false,
            }
        };
        handler(code);
        true
    }

    pub fn fail_next_register(&self, err: AxError) {
        self.state.lock().fail_register = Some(err);
    }

    pub fn fail_next_arm(&self, err: AxError) {
        self.state.lock().fail_arm = Some(err);
    }

    pub fn fail_next_disarm(&self, err: AxError) {
        self.state.lock().fail_disarm = Some(err);
    }

    /// Number of successful handler registrations.
    pub fn handler_installs(&self) -> usize {
        self.installs.load(Ordering::Relaxed)
    }

    /// Number of successful handler removals.
    pub fn handler_removals(&self) -> usize {
        self.removals.load(Ordering::Relaxed)
    }

    pub fn is_handler_registered(&self) -> bool {
        self.state.lock().handler.is_some()
    }

    pub fn is_armed(&self, code: SignalCode) -> bool {
        self.state.lock().armed.contains(&code)
    }

    /// Number of armed codes.
    pub fn armed_count(&self) -> usize {
        self.state.lock().armed.len()
    }
}

impl SignalHost for SimSignalHost {
    fn register_handler(&self, handler: SignalHandler) -> AxResult {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_register.take() {
            return Err(err);
        }
        if state.handler.is_some() {
            return ax_err!(AlreadyExists, "signal handler already registered");
        }
        state.handler = Some(handler);
        self.installs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn unregister_handler(&self) -> AxResult {
        let mut state = self.state.lock();
        if state.handler.take().is_none() {
            return ax_err!(BadState, "no signal handler registered");
        }
        self.removals.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn arm(&self, code: SignalCode) -> AxResult {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_arm.take() {
            return Err(err);
        }
        if !state.armed.insert(code) {
            return ax_err!(AlreadyExists, "signal already armed");
        }
        Ok(())
    }

    fn disarm(&self, code: SignalCode) -> AxResult {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_disarm.take() {
            return Err(err);
        }
        if !state.armed.remove(&code) {
            return ax_err!(NotFound, "signal not armed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::AtomicU32;

    #[test]
    fn test_sim_host_raise_requires_arm_and_handler() {
        let host = SimSignalHost::new();
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();

        host.arm(SignalCode(5)).unwrap();
        assert!(!host.raise(SignalCode(5)));

        host.register_handler(Arc::new(move |code: SignalCode| {
            hits_clone.fetch_add(code.0, Ordering::SeqCst);
        }))
        .unwrap();
        assert!(host.raise(SignalCode(5)));
        assert!(!host.raise(SignalCode(6)));
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        host.unregister_handler().unwrap();
        assert!(!host.raise(SignalCode(5)));
        assert_eq!(host.handler_installs(), 1);
        assert_eq!(host.handler_removals(), 1);
    }

    #[test]
    fn test_sim_host_failure_is_one_shot() {
        let host = SimSignalHost::new();
        host.fail_next_arm(AxError::ResourceBusy);
        assert_eq!(host.arm(SignalCode(1)), Err(AxError::ResourceBusy));
        assert!(host.arm(SignalCode(1)).is_ok());
        assert_eq!(host.arm(SignalCode(1)), Err(AxError::AlreadyExists));
        assert_eq!(host.disarm(SignalCode(2)), Err(AxError::NotFound));
    }
}
