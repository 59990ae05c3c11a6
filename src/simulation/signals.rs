//! External stop and save requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::Result;

/// What a signal (or a hook) asks the run to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalRequest {
    /// Save under the output name and stop cleanly.
    Stop,
    /// Save an intermediate file and continue.
    Save,
}

/// Flags raised by `SIGTERM` and `SIGUSR1`.
///
/// Each flag is cleared when it is taken, so one delivery triggers one
/// action.
#[derive(Clone, Debug, Default)]
pub struct Signals {
    stop: Arc<AtomicBool>,
    save: Arc<AtomicBool>,
}

impl Signals {
    /// Flags that only [`request_stop`](Self::request_stop) and
    /// [`request_save`](Self::request_save) can raise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the flags with the operating system.
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        use signal_hook::consts::{SIGTERM, SIGUSR1};

        let signals = Self::new();
        signal_hook::flag::register(SIGTERM, Arc::clone(&signals.stop))?;
        signal_hook::flag::register(SIGUSR1, Arc::clone(&signals.save))?;
        debug!("SIGTERM and SIGUSR1 handlers installed");
        Ok(signals)
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self> {
        debug!("signal handling is not available on this platform");
        Ok(Self::new())
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn request_save(&self) {
        self.save.store(true, Ordering::SeqCst);
    }

    /// Take the pending request, if any. Stop wins over save.
    pub fn take(&self) -> Option<SignalRequest> {
        if self.stop.swap(false, Ordering::SeqCst) {
            return Some(SignalRequest::Stop);
        }
        if self.save.swap(false, Ordering::SeqCst) {
            return Some(SignalRequest::Save);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_clears() {
        let signals = Signals::new();
        assert_eq!(signals.take(), None);
        signals.request_save();
        assert_eq!(signals.take(), Some(SignalRequest::Save));
        assert_eq!(signals.take(), None);
    }

    #[test]
    fn test_stop_wins() {
        let signals = Signals::new();
        signals.request_save();
        signals.request_stop();
        assert_eq!(signals.take(), Some(SignalRequest::Stop));
        assert_eq!(signals.take(), Some(SignalRequest::Save));
    }

    #[test]
    fn test_clones_share_flags() {
        let signals = Signals::new();
        let handle = signals.clone();
        handle.request_stop();
        assert_eq!(signals.take(), Some(SignalRequest::Stop));
    }
}
