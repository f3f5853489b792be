//! Global interrupt lock
//!
//! Thin wrappers over the `critical-section` crate. On bare metal the
//! critical section masks interrupt delivery; on hosted targets the `std`
//! implementation is a process-wide reentrant mutex, so a thread standing
//! in for an interrupt handler is held off exactly like a real ISR.
//!
//! State is restored from the token captured on acquisition, never from a
//! nesting counter. An inner lock restores what it observed on entry, so
//! nested locks compose.

use core::marker::PhantomData;

use critical_section::{CriticalSection, RestoreState};

/// Scoped lock: interrupts are held off from `new()` until drop.
///
/// Not `Send`: the restore token belongs to the acquiring thread.
pub struct Lock {
    state: RestoreState,
    _not_send: PhantomData<*const ()>,
}

impl Lock {
    /// Enter the critical section
    #[inline]
    pub fn new() -> Self {
        // SAFETY: released exactly once in `Drop`, on the same thread, and
        // `Lock` values cannot be leaked out of LIFO order without `forget`.
        let state = unsafe { critical_section::acquire() };
        Self {
            state,
            _not_send: PhantomData,
        }
    }

    /// Token for `critical_section::Mutex` access while the lock is held
    #[inline]
    pub fn cs(&self) -> CriticalSection<'_> {
        // SAFETY: the critical section is held for the lifetime of `self`.
        unsafe { CriticalSection::new() }
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lock {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: paired with the `acquire` in `new`.
        unsafe { critical_section::release(self.state) }
    }
}

/// Lock that can be released and re-taken inside its scope.
///
/// Used around callback invocation: mutate the shared structure, `unlock()`,
/// run the callback with interrupts enabled, `lock()` again. Dropping a
/// locked `ModifiableLock` releases it; dropping an unlocked one is a no-op.
pub struct ModifiableLock {
    state: Option<RestoreState>,
    _not_send: PhantomData<*const ()>,
}

impl ModifiableLock {
    /// Enter the critical section
    #[inline]
    pub fn new() -> Self {
        // SAFETY: see `Lock::new`; released in `unlock` or `Drop`.
        let state = unsafe { critical_section::acquire() };
        Self {
            state: Some(state),
            _not_send: PhantomData,
        }
    }

    /// Leave the critical section early (no-op if already unlocked)
    #[inline]
    pub fn unlock(&mut self) {
        if let Some(state) = self.state.take() {
            // SAFETY: paired with the acquire that produced `state`.
            unsafe { critical_section::release(state) }
        }
    }

    /// Re-enter the critical section (no-op if already locked)
    #[inline]
    pub fn lock(&mut self) {
        if self.state.is_none() {
            // SAFETY: released in `unlock` or `Drop`.
            self.state = Some(unsafe { critical_section::acquire() });
        }
    }

    /// Is the critical section currently held by this lock?
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.state.is_some()
    }

    /// Token for `critical_section::Mutex` access.
    ///
    /// Panics if the lock has been released.
    #[inline]
    pub fn cs(&self) -> CriticalSection<'_> {
        assert!(self.is_locked(), "critical section token requested while unlocked");
        // SAFETY: checked above; `unlock` needs `&mut self`, so the token
        // cannot outlive the locked state.
        unsafe { CriticalSection::new() }
    }
}

impl Default for ModifiableLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ModifiableLock {
    #[inline]
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use core::cell::Cell;
    use critical_section::Mutex;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    static COUNTER: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

    #[test]
    fn test_scoped_lock_guards_mutex() {
        let lock = Lock::new();
        let cell = COUNTER.borrow(lock.cs());
        cell.set(cell.get() + 1);
        assert!(cell.get() >= 1);
    }

    #[test]
    fn test_nested_locks_compose() {
        let outer = Lock::new();
        {
            let inner = Lock::new();
            let _ = COUNTER.borrow(inner.cs()).get();
        }
        // Outer section must still be held after the inner one restores.
        let _ = COUNTER.borrow(outer.cs()).get();
    }

    #[test]
    fn test_modifiable_unlock_relock() {
        let mut lock = ModifiableLock::new();
        assert!(lock.is_locked());
        lock.unlock();
        assert!(!lock.is_locked());
        lock.unlock();
        lock.lock();
        assert!(lock.is_locked());
        lock.lock();
        let _ = COUNTER.borrow(lock.cs()).get();
    }

    #[test]
    fn test_lock_excludes_other_threads() {
        let (tx, rx) = mpsc::channel();
        let lock = Lock::new();
        let handle = thread::spawn(move || {
            let _lock = Lock::new();
            tx.send(()).unwrap();
        });
        // The other thread cannot get in while we hold the section.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(lock);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_modifiable_unlock_lets_others_in() {
        let (tx, rx) = mpsc::channel();
        let mut lock = ModifiableLock::new();
        let handle = thread::spawn(move || {
            let _lock = Lock::new();
            tx.send(()).unwrap();
        });
        lock.unlock();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
    }
}
