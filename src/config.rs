use crate::signal::SignalCode;

/// Upper bound for the number of alert signal slots per session.
pub const MAX_ALERT_SIGNALS: usize = 32;

/// First notification code handed out by a session pool.
pub const FIRST_SIGNAL: SignalCode = SignalCode(1);

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        // The realtime signal range is available to user space.
        pub const HOST_SIGNAL_COUNT: usize = 32;
    } else if #[cfg(unix)] {
        // Only the two user signals are portable.
        pub const HOST_SIGNAL_COUNT: usize = 2;
    } else {
        pub const HOST_SIGNAL_COUNT: usize = MAX_ALERT_SIGNALS;
    }
}

/// Per-session configuration of the alert signal pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Code of the first pool slot; slots use consecutive codes.
    pub first_signal: SignalCode,
    /// Number of pool slots, at most [`MAX_ALERT_SIGNALS`].
    pub signal_count: usize,
}

impl SessionConfig {
    /// Creates a configuration, capping `signal_count` at [`MAX_ALERT_SIGNALS`].
    pub fn new(first_signal: SignalCode, signal_count: usize) -> Self {
        if signal_count > MAX_ALERT_SIGNALS {
            warn!(
                "Requested {} alert signals, limiting to {}",
                signal_count, MAX_ALERT_SIGNALS
            );
        }
        Self {
            first_signal,
            signal_count: signal_count.min(MAX_ALERT_SIGNALS),
        }
    }

    /// The configuration derived from the signals the host provides.
    pub fn host_default() -> Self {
        Self::new(FIRST_SIGNAL, HOST_SIGNAL_COUNT)
    }

    /// Iterates the notification codes of all pool slots in order.
    pub fn signal_codes(&self) -> impl Iterator<Item = SignalCode> + use<> {
        let first = self.first_signal.0;
        (0..self.signal_count as u32).map(move |i| SignalCode(first + i))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::host_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_caps_signal_count() {
        let config = SessionConfig::new(SignalCode(10), 100);
        assert_eq!(config.signal_count, MAX_ALERT_SIGNALS);
        assert_eq!(config.first_signal, SignalCode(10));
    }

    #[test]
    fn test_config_signal_codes() {
        let config = SessionConfig::new(SignalCode(5), 3);
        let codes: alloc::vec::Vec<_> = config.signal_codes().collect();
        assert_eq!(codes, alloc::vec![SignalCode(5), SignalCode(6), SignalCode(7)]);
    }

    #[test]
    fn test_host_default_within_bounds() {
        let config = SessionConfig::default();
        assert_eq!(config.first_signal, FIRST_SIGNAL);
        assert!(config.signal_count >= 1);
        assert!(config.signal_count <= MAX_ALERT_SIGNALS);
    }
}
