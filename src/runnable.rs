//! Runnables — deferred, zero-argument units of work
//!
//! The core never owns a runnable. It stores a `&'static` reference from
//! submission until invocation, so "the caller keeps it alive" is checked
//! by the compiler instead of by convention.

/// A unit of work executed by a context's dispatch loop.
///
/// `Sync` because the reference is handed from the submitting thread (or
/// interrupt) to the context's thread.
pub trait Runnable: Sync {
    fn execute(&self);
}

impl<F> Runnable for F
where
    F: Fn() + Sync,
{
    #[inline]
    fn execute(&self) {
        self()
    }
}

/// Reference form stored in queues and timeouts
pub type RunnableRef = &'static dyn Runnable;
