//! dispatch-rtos — Event-Driven Task Contexts
//!
//! Don't share state between threads, post work to the thread that owns it.
//!
//! A small runtime layer over an OS's threads:
//! - Fixed table of execution contexts, one thread and one dispatch loop each
//! - Interrupt-safe runnable queues (FIFO, bounded, no allocation)
//! - Many one-shot and periodic timeouts per context on a single OS timer
//! - One blocking wait per loop cycle on a per-context event word
//!
//! The queue, timer engine, lock, clock and statistics are `core`-only;
//! the `std` feature (default) adds threads, the OS timer and the registry.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod clock;
pub mod error;
pub mod event;
pub mod executor;
pub mod hook;
pub mod lock;
pub mod queue;
pub mod runnable;
pub mod task;
pub mod timeout;
pub mod timer;

#[cfg(feature = "std")]
pub mod context;
#[cfg(feature = "std")]
pub mod future;
#[cfg(feature = "std")]
pub mod os_timer;
#[cfg(feature = "std")]
pub mod registry;
#[cfg(feature = "std")]
pub mod stack;

pub use clock::{Clock, SoftwareClock};
pub use error::AsyncError;
pub use executor::RunnableExecutor;
pub use hook::{ContextHook, RuntimeStatistics, TaskStatistics};
pub use lock::{Lock, ModifiableLock};
pub use runnable::{Runnable, RunnableRef};
pub use task::{ContextId, TaskState, CONTEXT_INVALID, DEFAULT_STACK_SIZE};
pub use timeout::{TimeUnit, Timeout};
pub use timer::{Arm, Timer};

#[cfg(feature = "std")]
pub use clock::{system_clock, MonotonicClock};
#[cfg(feature = "std")]
pub use context::{current_task_context, TaskContext};
#[cfg(feature = "std")]
pub use event::EventWord;
#[cfg(feature = "std")]
pub use future::{FutureSupport, WAIT_EVENTS_US};
#[cfg(feature = "std")]
pub use os_timer::OneShotTimer;
#[cfg(feature = "std")]
pub use registry::Registry;
#[cfg(feature = "std")]
pub use stack::StackUsage;
#[cfg(feature = "std")]
pub use task::{TaskConfig, TaskFn};
