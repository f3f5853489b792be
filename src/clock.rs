//! Time sources — microsecond monotonic counters
//!
//! The timer engine works on absolute microsecond timestamps read from a
//! [`Clock`]. On hosted targets that is [`MonotonicClock`]; tests and
//! simulations use [`SoftwareClock`], which only moves when told to.

use core::cell::Cell;

use critical_section::Mutex;

/// Monotonic microsecond time source
pub trait Clock: Sync {
    /// Current time in microseconds
    fn now_us(&self) -> u64;

    /// Current time in milliseconds
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }

    /// Elapsed microseconds since a reference point
    fn elapsed_since(&self, reference: u64) -> u64 {
        self.now_us().wrapping_sub(reference)
    }
}

/// Manually advanced clock.
///
/// Guarded by the critical section rather than an `AtomicU64` so it also
/// works on targets without 64-bit atomics.
pub struct SoftwareClock {
    ticks_us: Mutex<Cell<u64>>,
}

impl SoftwareClock {
    /// Clock starting at t = 0
    pub const fn new() -> Self {
        Self {
            ticks_us: Mutex::new(Cell::new(0)),
        }
    }

    /// Advance time by microseconds
    pub fn advance(&self, us: u64) {
        critical_section::with(|cs| {
            let ticks = self.ticks_us.borrow(cs);
            ticks.set(ticks.get().wrapping_add(us));
        });
    }

    /// Jump to an absolute time
    pub fn set(&self, us: u64) {
        critical_section::with(|cs| self.ticks_us.borrow(cs).set(us));
    }

    /// Back to t = 0
    pub fn reset(&self) {
        self.set(0);
    }
}

impl Default for SoftwareClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SoftwareClock {
    fn now_us(&self) -> u64 {
        critical_section::with(|cs| self.ticks_us.borrow(cs).get())
    }
}

#[cfg(feature = "std")]
pub use self::monotonic::{system_clock, MonotonicClock};

#[cfg(feature = "std")]
mod monotonic {
    use std::sync::OnceLock;
    use std::time::Instant;

    use super::Clock;

    /// `Instant`-based clock; t = 0 is the first reading.
    pub struct MonotonicClock {
        origin: OnceLock<Instant>,
    }

    impl MonotonicClock {
        pub const fn new() -> Self {
            Self {
                origin: OnceLock::new(),
            }
        }
    }

    impl Default for MonotonicClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for MonotonicClock {
        fn now_us(&self) -> u64 {
            let origin = self.origin.get_or_init(Instant::now);
            origin.elapsed().as_micros() as u64
        }
    }

    static SYSTEM_CLOCK: MonotonicClock = MonotonicClock::new();

    /// Process-wide monotonic clock
    pub fn system_clock() -> &'static MonotonicClock {
        &SYSTEM_CLOCK
    }
}
