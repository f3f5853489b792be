//! Stack high-water marks for context threads
//!
//! At thread start the unused part of the stack is painted with a known
//! word. A query scans up from the far end to the first overwritten word,
//! so depth reached anywhere on the thread (runnables, timeout callbacks)
//! is seen. Two bands stay unpainted: one at the far end, where hosted
//! targets keep thread-local storage and guard pages, and one just below
//! the painting frame. Assumes a downward-growing stack.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

const STACK_PAINT_WORD: u32 = 0xDEAD_BEEF;

/// Unpainted band at the far end of the stack
const PAINT_GUARD: usize = 32 * 1024;

/// Unpainted band below the painting frame
const PAINT_SKIP: usize = 4 * 1024;

/// Stack figures for one context thread (bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackUsage {
    pub stack_size: usize,
    pub used_size: usize,
}

pub(crate) struct StackMonitor {
    size: AtomicUsize,
    base: AtomicUsize,
    lowest: AtomicUsize,
    /// Painted window `[bottom, top)`, only while the thread is alive
    painted: Mutex<Option<(usize, usize)>>,
}

impl StackMonitor {
    pub(crate) const fn new() -> Self {
        Self {
            size: AtomicUsize::new(0),
            base: AtomicUsize::new(0),
            lowest: AtomicUsize::new(usize::MAX),
            painted: Mutex::new(None),
        }
    }

    pub(crate) fn set_size(&self, size: usize) {
        self.size.store(size, Ordering::Relaxed);
    }

    /// Record the stack base and paint the rest. First thing on the thread.
    pub(crate) fn start(&self) {
        let base = stack_pointer();
        self.lowest.fetch_min(base, Ordering::Relaxed);
        let window = paint(base, self.size.load(Ordering::Relaxed));
        *self.painted.lock().unwrap_or_else(PoisonError::into_inner) = window;
        self.base.store(base, Ordering::Release);
    }

    /// Fold the current depth into the mark
    pub(crate) fn sample(&self) {
        self.lowest.fetch_min(stack_pointer(), Ordering::Relaxed);
    }

    /// Fold the painted window into the mark and stop scanning it.
    /// Must run on the owning thread before it exits.
    pub(crate) fn freeze(&self) {
        let mut painted = self.painted.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(window) = painted.take() {
            self.lowest.fetch_min(scan(window), Ordering::Relaxed);
        }
    }

    pub(crate) fn usage(&self) -> Option<StackUsage> {
        let base = self.base.load(Ordering::Acquire);
        if base == 0 {
            return None;
        }
        let painted = self.painted.lock().unwrap_or_else(PoisonError::into_inner);
        let lowest = painted
            .map_or(usize::MAX, scan)
            .min(self.lowest.load(Ordering::Relaxed));
        Some(StackUsage {
            stack_size: self.size.load(Ordering::Relaxed),
            used_size: base.saturating_sub(lowest),
        })
    }
}

/// Runs [`StackMonitor::freeze`] when the context thread leaves its entry
/// function, unwinding included
pub(crate) struct FreezeOnExit<'a>(pub(crate) &'a StackMonitor);

impl Drop for FreezeOnExit<'_> {
    fn drop(&mut self) {
        self.0.freeze();
    }
}

#[inline(never)]
fn stack_pointer() -> usize {
    let marker = 0u8;
    core::hint::black_box(&marker) as *const u8 as usize
}

#[inline(never)]
fn paint(base: usize, size: usize) -> Option<(usize, usize)> {
    if size <= PAINT_GUARD + PAINT_SKIP {
        return None;
    }
    let top = stack_pointer().saturating_sub(PAINT_SKIP) & !3;
    let bottom = (base.saturating_sub(size).saturating_add(PAINT_GUARD) + 3) & !3;
    if top <= bottom {
        return None;
    }

    // Top down, touching pages in stack-growth order
    let mut addr = top;
    while addr >= bottom + 4 {
        addr -= 4;
        // SAFETY: [bottom, top) lies inside this thread's stack, below every
        // live frame and above the guard band.
        unsafe { core::ptr::write_volatile(addr as *mut u32, STACK_PAINT_WORD) };
    }
    Some((bottom, top))
}

/// Lowest overwritten address in the window, `usize::MAX` if untouched
fn scan((bottom, top): (usize, usize)) -> usize {
    let mut addr = bottom;
    while addr < top {
        // SAFETY: a window is only scanned under the `painted` lock, which
        // the owning thread clears before its stack goes away.
        if unsafe { core::ptr::read_volatile(addr as *const u32) } != STACK_PAINT_WORD {
            return addr;
        }
        addr += 4;
    }
    usize::MAX
}
