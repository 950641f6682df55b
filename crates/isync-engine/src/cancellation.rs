//! A cancellable context threaded through every suspension point.
//!
//! Hand-rolled rather than pulled from `tokio_util`: the engine is entirely
//! synchronous (`std::thread`, `ureq`, `std::process::Command`), so a single
//! `Arc<(Mutex<bool>, Condvar)>` is enough to make the rate-limit sleep
//! interruptible without dragging in an async runtime for one flag.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Signals cancellation. Wakes any thread parked in [`Self::sleep`].
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(|p| p.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleeps for `duration`, waking early if cancellation fires.
    ///
    /// Returns `true` if the full duration elapsed uninterrupted, `false`
    /// if cancellation woke it early (including if it was already cancelled).
    pub fn sleep(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        if *guard {
            return false;
        }
        let (guard, timeout_result) = cvar
            .wait_timeout(guard, duration)
            .unwrap_or_else(|p| p.into_inner());
        !*guard && timeout_result.timed_out()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
