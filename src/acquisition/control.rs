// src/acquisition/control.rs
//! Start/stop control shared between the acquisition loop and its owner

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default)]
struct ControlInner {
    polling: AtomicBool,
    terminate: AtomicBool,
    lock: Mutex<()>,
    changed: Condvar,
}

/// Polling and termination flags with change notification
///
/// Clones share state. Waiters block on a condition variable instead of
/// spinning on the flags.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionControl {
    inner: Arc<ControlInner>,
}

impl AcquisitionControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_polling(&self) {
        if !self.inner.polling.swap(true, Ordering::SeqCst) {
            info!("polling started");
        }
        self.notify();
    }

    pub fn stop_polling(&self) {
        if self.inner.polling.swap(false, Ordering::SeqCst) {
            info!("polling stopped");
        }
        self.notify();
    }

    /// Ask the loop and every worker to exit; also stops polling
    pub fn terminate(&self) {
        self.inner.polling.store(false, Ordering::SeqCst);
        self.inner.terminate.store(true, Ordering::SeqCst);
        self.notify();
    }

    pub fn is_polling(&self) -> bool {
        self.inner.polling.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminate.load(Ordering::SeqCst)
    }

    /// Block until a flag changes or `timeout` elapses
    ///
    /// `polling_seen` is the polling state the caller last acted on. Both
    /// flags are rechecked under the lock, so a transition that lands between
    /// the caller's read and this call returns at once instead of sleeping
    /// through `timeout`. Returns true when a change was observed.
    pub fn wait_for_change(&self, polling_seen: bool, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if self.is_terminated() || self.is_polling() != polling_seen {
            return true;
        }
        !self.inner.changed.wait_for(&mut guard, timeout).timed_out()
    }

    fn notify(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.changed.notify_all();
    }
}
