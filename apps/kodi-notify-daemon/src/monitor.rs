//! Host shutdown signal.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

/// The host's "please exit" flag.
pub trait HostMonitor {
    fn abort_requested(&self) -> bool;

    /// Block for up to `timeout`; returns `true` once abort has been requested.
    fn wait_for_abort(&self, timeout: Duration) -> bool;
}

/// Abort flag raised by SIGINT/SIGTERM, which is how the host stops its
/// child services.
#[derive(Debug, Clone, Default)]
pub struct SignalMonitor {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl SignalMonitor {
    /// Install the signal handler.
    ///
    /// Must run before any other thread is spawned so every thread inherits
    /// the blocked signal mask.
    pub fn install() -> Self {
        let monitor = Self::default();
        let handle = monitor.clone();
        simple_signal::set_handler(
            &[simple_signal::Signal::Int, simple_signal::Signal::Term],
            move |signals| {
                info!("Received {:?}", signals);
                handle.request_abort();
            },
        );
        monitor
    }

    pub fn request_abort(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }
}

impl HostMonitor for SignalMonitor {
    fn abort_requested(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_for_abort(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |aborted| !*aborted)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}
