//! Task identity and configuration — static, build-time task descriptors
//!
//! Contexts are identified by a small integer fixed at build time. Lower
//! ids are higher priority, matching the order the application declares
//! its tasks in: each context's thread gets [`default_priority`] unless
//! its configuration overrides it.

#[cfg(feature = "std")]
use crate::context::TaskContext;

/// Context identifier, `0..TASKS`
pub type ContextId = u8;

/// Sentinel: "no context" (interrupt context, inactive timeout)
pub const CONTEXT_INVALID: ContextId = 0xFF;

/// Default thread stack size for a context (bytes)
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Thread priority of context 0, on the portable 0..=99 scale (higher runs first)
pub const PRIORITY_HIGHEST: u8 = 99;

/// Thread priority for `context`: one step below its predecessor
pub const fn default_priority(context: ContextId) -> u8 {
    PRIORITY_HIGHEST.saturating_sub(context)
}

/// Task function, run on the context's thread once it is started.
///
/// The default is [`TaskContext::dispatch`]; a custom function can do
/// per-thread setup and then call `dispatch` itself.
#[cfg(feature = "std")]
pub type TaskFn<const QUEUE: usize> = fn(&'static TaskContext<QUEUE>);

/// Context lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TaskState {
    /// Constructed, no identity bound yet
    Uninitialized = 0,
    /// Thread and timer created, not started
    Initialized = 1,
    /// Dispatch loop active
    Running = 2,
    /// Stop event posted, executor shut down
    Stopping = 3,
    /// Loop exited; terminal
    Stopped = 4,
}

impl TaskState {
    /// Decode from the atomic representation
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Uninitialized,
            1 => TaskState::Initialized,
            2 => TaskState::Running,
            3 => TaskState::Stopping,
            _ => TaskState::Stopped,
        }
    }

    /// Has the context been started (possibly already stopped)?
    pub const fn is_started(self) -> bool {
        matches!(self, TaskState::Running | TaskState::Stopping | TaskState::Stopped)
    }
}

/// Per-task configuration passed to [`Registry::init`](crate::Registry::init)
#[cfg(feature = "std")]
#[derive(Clone, Copy)]
pub struct TaskConfig<const QUEUE: usize> {
    /// Context slot this task drives
    pub context: ContextId,
    /// Thread name
    pub name: &'static str,
    /// Thread stack size in bytes
    pub stack_size: usize,
    /// Thread priority, 0..=99
    pub priority: u8,
    /// Custom task function (`None` = plain dispatch loop)
    pub task_function: Option<TaskFn<QUEUE>>,
}

#[cfg(feature = "std")]
impl<const QUEUE: usize> TaskConfig<QUEUE> {
    /// Task with the default stack size and dispatch loop
    pub const fn new(context: ContextId, name: &'static str) -> Self {
        Self {
            context,
            name,
            stack_size: DEFAULT_STACK_SIZE,
            priority: default_priority(context),
            task_function: None,
        }
    }

    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub const fn with_task_function(mut self, task_function: TaskFn<QUEUE>) -> Self {
        self.task_function = Some(task_function);
        self
    }
}
