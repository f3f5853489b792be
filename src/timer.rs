//! Timer engine — many logical timeouts on one underlying one-shot timer
//!
//! Each context owns one `Timer`: an intrusive singly linked list of active
//! [`Timeout`]s, ordered by absolute deadline, stable for equal deadlines.
//! The context asks [`Timer::next_delta`] how long to arm its single OS
//! one-shot timer for and, on expiry, drains due timeouts with
//! [`Timer::process_next_timeout`].
//!
//! Periodic timeouts re-arm with `deadline += period`, never
//! `now + period`, so late processing does not accumulate drift.

use core::cell::Cell;
use core::ptr;

use critical_section::{CriticalSection, Mutex};

use crate::lock::{Lock, ModifiableLock};
use crate::runnable::RunnableRef;
use crate::task::ContextId;
use crate::timeout::{Timeout, TimeoutState};

/// Result of arming a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    /// Timeout was already active; nothing changed
    Ignored,
    /// Queued behind an earlier deadline
    Queued,
    /// New earliest deadline; the OS timer must be re-armed
    Earliest,
}

/// Per-context timer engine
pub struct Timer {
    head: Mutex<Cell<Option<&'static Timeout>>>,
}

impl Timer {
    /// Empty timer list
    pub const fn new() -> Self {
        Self {
            head: Mutex::new(Cell::new(None)),
        }
    }

    /// Is `timeout` armed (in this or any other engine)?
    pub fn is_active(&self, timeout: &Timeout) -> bool {
        timeout.is_active()
    }

    /// Arm a one-shot timeout firing `delay_us` after `now`.
    ///
    /// No-op if the timeout is already active (first scheduler wins).
    pub fn set(
        &self,
        timeout: &'static Timeout,
        runnable: RunnableRef,
        context: ContextId,
        delay_us: u64,
        now: u64,
    ) -> Arm {
        self.arm(timeout, runnable, context, now.saturating_add(delay_us), 0)
    }

    /// Arm a periodic timeout, first firing one `period_us` after `now`.
    ///
    /// Panics on a zero period.
    pub fn set_cyclic(
        &self,
        timeout: &'static Timeout,
        runnable: RunnableRef,
        context: ContextId,
        period_us: u64,
        now: u64,
    ) -> Arm {
        assert!(period_us > 0, "periodic timeout with zero period");
        self.arm(timeout, runnable, context, now.saturating_add(period_us), period_us)
    }

    fn arm(
        &self,
        timeout: &'static Timeout,
        runnable: RunnableRef,
        context: ContextId,
        deadline: u64,
        period: u64,
    ) -> Arm {
        let lock = Lock::new();
        let cs = lock.cs();
        if timeout.get(cs).active {
            return Arm::Ignored;
        }
        timeout.set(
            cs,
            TimeoutState {
                runnable: Some(runnable),
                context,
                active: true,
                deadline,
                period,
                next: None,
            },
        );
        if self.insert(cs, timeout) {
            Arm::Earliest
        } else {
            Arm::Queued
        }
    }

    /// Link `timeout` after every entry with a deadline <= its own.
    /// Returns true if it became the head.
    fn insert(&self, cs: CriticalSection<'_>, timeout: &'static Timeout) -> bool {
        let deadline = timeout.get(cs).deadline;
        let head = self.head.borrow(cs);

        let mut prev: Option<&'static Timeout> = None;
        let mut cursor = head.get();
        while let Some(current) = cursor {
            let state = current.get(cs);
            if state.deadline > deadline {
                break;
            }
            prev = Some(current);
            cursor = state.next;
        }

        timeout.update(cs, |state| state.next = cursor);
        match prev {
            Some(prev) => {
                prev.update(cs, |state| state.next = Some(timeout));
                false
            }
            None => {
                head.set(Some(timeout));
                true
            }
        }
    }

    /// Remove `timeout` from this list. Returns false if it is not linked here.
    fn unlink(&self, cs: CriticalSection<'_>, timeout: &Timeout) -> bool {
        let head = self.head.borrow(cs);

        let mut prev: Option<&'static Timeout> = None;
        let mut cursor = head.get();
        while let Some(current) = cursor {
            let next = current.get(cs).next;
            if ptr::eq(current, timeout) {
                match prev {
                    Some(prev) => prev.update(cs, |state| state.next = next),
                    None => head.set(next),
                }
                current.update(cs, |state| state.next = None);
                return true;
            }
            prev = Some(current);
            cursor = next;
        }
        false
    }

    /// Cancel `timeout` if it is armed in this engine.
    ///
    /// Idempotent. A firing already in progress completes; a periodic
    /// timeout cancelled from inside (or during) its own callback is not
    /// re-armed.
    pub fn cancel(&self, timeout: &Timeout) -> bool {
        let lock = Lock::new();
        let cs = lock.cs();
        if !self.unlink(cs, timeout) {
            return false;
        }
        timeout.update(cs, |state| {
            state.active = false;
            state.period = 0;
        });
        true
    }

    /// Fire the earliest timeout if it is due at `now`.
    ///
    /// At most one callback runs per call, outside the lock. Returns whether
    /// another timeout is due at `now`, so callers loop until false.
    pub fn process_next_timeout(&self, now: u64) -> bool {
        let mut lock = ModifiableLock::new();

        let runnable = {
            let cs = lock.cs();
            let head = self.head.borrow(cs);
            let Some(timeout) = head.get() else {
                return false;
            };
            let mut state = timeout.get(cs);
            if state.deadline > now {
                return false;
            }

            head.set(state.next);
            state.next = None;
            if state.period != 0 {
                // Re-armed before the callback runs so a cancel during the
                // callback unlinks it again.
                state.deadline = state.deadline.saturating_add(state.period);
                timeout.set(cs, state);
                self.insert(cs, timeout);
            } else {
                state.active = false;
                timeout.set(cs, state);
            }
            state.runnable
        };

        lock.unlock();
        if let Some(runnable) = runnable {
            runnable.execute();
        }
        lock.lock();

        let cs = lock.cs();
        self.head
            .borrow(cs)
            .get()
            .is_some_and(|next| next.get(cs).deadline <= now)
    }

    /// Microseconds until the earliest deadline (0 if already due),
    /// `None` if nothing is armed.
    pub fn next_delta(&self, now: u64) -> Option<u64> {
        critical_section::with(|cs| {
            self.head
                .borrow(cs)
                .get()
                .map(|head| head.get(cs).deadline.saturating_sub(now))
        })
    }

    /// Number of armed timeouts
    pub fn active_count(&self) -> usize {
        critical_section::with(|cs| {
            let mut count = 0;
            let mut cursor = self.head.borrow(cs).get();
            while let Some(current) = cursor {
                count += 1;
                cursor = current.get(cs).next;
            }
            count
        })
    }

    /// Nothing armed?
    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.head.borrow(cs).get().is_none())
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
