//! Runnable executor — interrupt-safe FIFO feeding one dispatch loop
//!
//! Producers call [`RunnableExecutor::enqueue`] from any thread or
//! interrupt; only the owning context calls [`RunnableExecutor::process`].
//! The queue is touched under the global lock, callbacks run outside it.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;

use crate::error::AsyncError;
use crate::lock::{Lock, ModifiableLock};
use crate::queue::RunnableQueue;
use crate::runnable::RunnableRef;

/// Fixed-capacity executor for one context
pub struct RunnableExecutor<const N: usize> {
    queue: Mutex<RefCell<RunnableQueue<N>>>,
    shut_down: AtomicBool,
}

impl<const N: usize> RunnableExecutor<N> {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(RunnableQueue::new())),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Append a runnable.
    ///
    /// `Ok(true)` when the queue went from empty to non-empty, i.e. the
    /// owner has to be signalled; `Ok(false)` when a signal is already
    /// pending.
    pub fn enqueue(&self, runnable: RunnableRef) -> Result<bool, AsyncError> {
        if self.is_shut_down() {
            return Err(AsyncError::ShutDown);
        }
        let lock = Lock::new();
        // Re-checked under the lock: `shutdown` clears the queue under it
        if self.is_shut_down() {
            return Err(AsyncError::ShutDown);
        }
        let mut queue = self.queue.borrow_ref_mut(lock.cs());
        let was_empty = queue.is_empty();
        queue
            .push(runnable)
            .map_err(|_| AsyncError::QueueFull { capacity: N })?;
        Ok(was_empty)
    }

    /// Stop accepting and dispatching. Queued entries are dropped.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let lock = Lock::new();
        self.queue.borrow_ref_mut(lock.cs()).clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Drain the queue, invoking each runnable with the lock released.
    ///
    /// Runnables enqueued while draining (including by the runnables
    /// themselves) are run in the same pass. Returns the number invoked.
    pub fn process(&self) -> usize {
        let mut lock = ModifiableLock::new();
        let mut count = 0;
        loop {
            if self.is_shut_down() {
                break;
            }
            let next = self.queue.borrow_ref_mut(lock.cs()).pop();
            let Some(runnable) = next else {
                break;
            };
            lock.unlock();
            runnable.execute();
            count += 1;
            lock.lock();
        }
        count
    }

    /// Number of queued runnables
    pub fn pending(&self) -> usize {
        let lock = Lock::new();
        let len = self.queue.borrow_ref(lock.cs()).len();
        len
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for RunnableExecutor<N> {
    fn default() -> Self {
        Self::new()
    }
}
