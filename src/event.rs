//! Event bitmask — the single thing a dispatch loop blocks on
//!
//! One bit per internal producer plus a reserved stop bit. Producers set
//! bits from any thread; the owning thread waits until the word is
//! non-zero, then takes and clears everything it observed. Bits set
//! between two waits coalesce into one wake-up.

/// Event word type
pub type EventMask = u32;

/// Runnable queue became non-empty
pub const RUNNABLE_EVENT: EventMask = 1 << 0;
/// Timer engine needs servicing (OS timer expired or new earliest deadline)
pub const TIMER_EVENT: EventMask = 1 << 1;
/// Number of producer bits
pub const EVENT_COUNT: u32 = 2;
/// Reserved: stop the dispatch loop
pub const STOP_EVENT: EventMask = 1 << EVENT_COUNT;
/// Every bit a dispatch loop waits for
pub const WAIT_EVENT_MASK: EventMask = (STOP_EVENT << 1) - 1;

#[cfg(feature = "std")]
pub use self::word::EventWord;

#[cfg(feature = "std")]
mod word {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::OnceLock;
    use std::thread::{self, Thread};

    use super::{EventMask, WAIT_EVENT_MASK};

    /// Per-context event word.
    ///
    /// Lock-free: an atomic word plus park/unpark of the owning thread.
    /// `unpark` leaves a token behind, so a set racing the owner going to
    /// sleep is never lost.
    pub struct EventWord {
        bits: AtomicU32,
        owner: OnceLock<Thread>,
    }

    impl EventWord {
        pub const fn new() -> Self {
            Self {
                bits: AtomicU32::new(0),
                owner: OnceLock::new(),
            }
        }

        /// Bind the thread that will call `wait_events`. First bind wins.
        pub fn bind_owner(&self, owner: Thread) {
            let _ = self.owner.set(owner);
        }

        /// OR `mask` into the word and wake the owner. Any thread.
        pub fn set_events(&self, mask: EventMask) {
            self.bits.fetch_or(mask, Ordering::AcqRel);
            if let Some(owner) = self.owner.get() {
                owner.unpark();
            }
        }

        /// Block until at least one waited-for bit is set, then take and
        /// clear the observed bits. Never returns 0. Owner thread only.
        pub fn wait_events(&self) -> EventMask {
            debug_assert!(
                self.owner
                    .get()
                    .map_or(true, |owner| owner.id() == thread::current().id()),
                "wait_events called off the owning thread"
            );
            loop {
                let events = self.take();
                if events != 0 {
                    return events;
                }
                thread::park();
            }
        }

        /// Take and clear pending bits without blocking (0 if none)
        pub fn take(&self) -> EventMask {
            self.bits.fetch_and(!WAIT_EVENT_MASK, Ordering::AcqRel) & WAIT_EVENT_MASK
        }

        /// Peek at pending bits
        pub fn pending(&self) -> EventMask {
            self.bits.load(Ordering::Acquire) & WAIT_EVENT_MASK
        }
    }

    impl Default for EventWord {
        fn default() -> Self {
            Self::new()
        }
    }
}
