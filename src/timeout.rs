//! Timeout handles — caller-owned records linked into a timer list
//!
//! A `Timeout` is a `static` (or otherwise `'static`) record. While active
//! it is threaded into exactly one [`Timer`](crate::Timer)'s intrusive,
//! deadline-ordered list through its own `next` link, so the timer engine
//! needs no storage of its own.
//!
//! All fields live behind a `critical_section::Mutex` and are only read or
//! written with the global lock held.

use core::cell::Cell;
use core::fmt;

use critical_section::{CriticalSection, Mutex};

use crate::runnable::RunnableRef;
use crate::task::{ContextId, CONTEXT_INVALID};

/// Unit multiplier for `schedule` delays (to microseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    /// Microseconds per unit
    pub const fn micros(self) -> u64 {
        match self {
            TimeUnit::Microseconds => 1,
            TimeUnit::Milliseconds => 1_000,
            TimeUnit::Seconds => 1_000_000,
        }
    }

    /// Convert `value` units to microseconds
    pub const fn to_micros(self, value: u32) -> u64 {
        value as u64 * self.micros()
    }
}

#[derive(Clone, Copy)]
pub(crate) struct TimeoutState {
    pub(crate) runnable: Option<RunnableRef>,
    pub(crate) context: ContextId,
    pub(crate) active: bool,
    /// Absolute deadline (µs)
    pub(crate) deadline: u64,
    /// Repeat period (µs), 0 = one-shot
    pub(crate) period: u64,
    pub(crate) next: Option<&'static Timeout>,
}

impl TimeoutState {
    const INACTIVE: TimeoutState = TimeoutState {
        runnable: None,
        context: CONTEXT_INVALID,
        active: false,
        deadline: 0,
        period: 0,
        next: None,
    };
}

/// Timed callback handle
pub struct Timeout {
    state: Mutex<Cell<TimeoutState>>,
}

impl Timeout {
    /// Inactive timeout, usable in a `static`
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(TimeoutState::INACTIVE)),
        }
    }

    #[inline]
    pub(crate) fn get(&self, cs: CriticalSection<'_>) -> TimeoutState {
        self.state.borrow(cs).get()
    }

    #[inline]
    pub(crate) fn set(&self, cs: CriticalSection<'_>, state: TimeoutState) {
        self.state.borrow(cs).set(state);
    }

    #[inline]
    pub(crate) fn update(&self, cs: CriticalSection<'_>, f: impl FnOnce(&mut TimeoutState)) {
        let cell = self.state.borrow(cs);
        let mut state = cell.get();
        f(&mut state);
        cell.set(state);
    }

    /// Is the timeout armed in some context?
    pub fn is_active(&self) -> bool {
        critical_section::with(|cs| self.get(cs).active)
    }

    /// Context the timeout was last scheduled in (`CONTEXT_INVALID` after
    /// a registry-level cancel or before the first schedule)
    pub fn context(&self) -> ContextId {
        critical_section::with(|cs| self.get(cs).context)
    }

    /// Absolute deadline of the next firing, if active
    pub fn deadline(&self) -> Option<u64> {
        critical_section::with(|cs| {
            let state = self.get(cs);
            state.active.then_some(state.deadline)
        })
    }

    /// Repeat period in µs (`None` for one-shot)
    pub fn period(&self) -> Option<u64> {
        critical_section::with(|cs| {
            let period = self.get(cs).period;
            (period != 0).then_some(period)
        })
    }

    /// Detach from the owning context, returning the old id.
    pub(crate) fn take_context(&self) -> ContextId {
        critical_section::with(|cs| {
            let mut old = CONTEXT_INVALID;
            self.update(cs, |state| {
                old = state.context;
                state.context = CONTEXT_INVALID;
            });
            old
        })
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = critical_section::with(|cs| self.get(cs));
        f.debug_struct("Timeout")
            .field("context", &state.context)
            .field("active", &state.active)
            .field("deadline", &state.deadline)
            .field("period", &state.period)
            .finish()
    }
}
