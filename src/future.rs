//! Future support — blocking hand-off between a context and its callers
//!
//! A caller outside a context submits work and then `wait`s; the runnable
//! `notify`s when the result is ready. Waiting polls in `WAIT_EVENTS_US`
//! slices, so a notification is never missed even if it lands between
//! two checks.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::context::current_task_context;
use crate::task::ContextId;

/// Poll slice for [`FutureSupport::wait`] (µs)
pub const WAIT_EVENTS_US: u64 = 100;

/// Completion flag bound to the context that completes it
pub struct FutureSupport {
    context: ContextId,
    done: Mutex<bool>,
    changed: Condvar,
}

impl FutureSupport {
    pub const fn new(context: ContextId) -> Self {
        Self {
            context,
            done: Mutex::new(false),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Context this future is completed in
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Block until notified, then consume the notification.
    ///
    /// Must not be called from the bound context: it would block the
    /// dispatch loop that is supposed to notify.
    pub fn wait(&self) {
        debug_assert!(
            !self.verify_task_context(),
            "ctx {}: wait would block its own dispatch loop",
            self.context
        );
        let slice = Duration::from_micros(WAIT_EVENTS_US);
        let mut done = self.lock();
        while !*done {
            done = self
                .changed
                .wait_timeout(done, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *done = false;
    }

    /// As [`wait`](Self::wait), giving up after `timeout`.
    /// Returns whether a notification was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let slice = Duration::from_micros(WAIT_EVENTS_US);
        let mut done = self.lock();
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            done = self
                .changed
                .wait_timeout(done, slice.min(deadline - now))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *done = false;
        true
    }

    /// Mark complete and wake waiters
    pub fn notify(&self) {
        *self.lock() = true;
        self.changed.notify_all();
    }

    /// Is the caller running in the bound context?
    pub fn verify_task_context(&self) -> bool {
        current_task_context() == self.context
    }

    /// Panic unless the caller runs in the bound context
    pub fn assert_task_context(&self) {
        assert!(
            self.verify_task_context(),
            "ctx {}: called from context {}",
            self.context,
            current_task_context()
        );
    }
}
