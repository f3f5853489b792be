//! Context registry — the fixed table of execution contexts
//!
//! Static context table, no dynamic allocation after construction.
//! `init` creates every configured context's thread and timer, `run`
//! releases them all. Submission calls index the table and forward; the
//! contexts do their own synchronization.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::clock::Clock;
use crate::context::{current_task_context, TaskContext};
use crate::error::AsyncError;
use crate::hook::ContextHook;
use crate::lock::Lock;
use crate::runnable::RunnableRef;
use crate::stack::StackUsage;
use crate::task::{ContextId, TaskConfig, TaskState, CONTEXT_INVALID};
use crate::timeout::{TimeUnit, Timeout};

/// `TASKS` contexts, each with a `QUEUE`-entry runnable queue
pub struct Registry<const TASKS: usize, const QUEUE: usize> {
    contexts: [TaskContext<QUEUE>; TASKS],
    initialized: AtomicBool,
    running: AtomicBool,
}

impl<const TASKS: usize, const QUEUE: usize> Registry<TASKS, QUEUE> {
    /// Registry with contexts `0..TASKS` driven by `clock`
    pub fn new(clock: &'static dyn Clock) -> Self {
        Self::build(clock, None)
    }

    /// Same as [`new`](Self::new), reporting busy/idle edges to `hook`
    pub fn with_hook(clock: &'static dyn Clock, hook: &'static dyn ContextHook) -> Self {
        Self::build(clock, Some(hook))
    }

    fn build(clock: &'static dyn Clock, hook: Option<&'static dyn ContextHook>) -> Self {
        assert!(
            TASKS < CONTEXT_INVALID as usize,
            "at most {} contexts",
            CONTEXT_INVALID
        );
        Self {
            contexts: core::array::from_fn(|id| TaskContext::new(id as ContextId, clock, hook)),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Create a thread and OS timer for every configured task.
    ///
    /// Configurations are validated as a whole before anything is created.
    /// Contexts without a configuration stay uninitialized.
    pub fn init(&'static self, configs: &[TaskConfig<QUEUE>]) -> Result<(), AsyncError> {
        let mut seen = [false; TASKS];
        for config in configs {
            let slot = seen
                .get_mut(config.context as usize)
                .ok_or(AsyncError::InvalidContext(config.context))?;
            if *slot {
                return Err(AsyncError::DuplicateContext(config.context));
            }
            *slot = true;
        }

        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(AsyncError::AlreadyInitialized);
        }
        for config in configs {
            self.contexts[config.context as usize].create_task(config)?;
        }

        log::info!("registry: initialized {} of {} contexts", configs.len(), TASKS);
        Ok(())
    }

    /// Start every created context. A second call is a no-op.
    pub fn run(&self) -> Result<(), AsyncError> {
        if !self.is_initialized() {
            return Err(AsyncError::NotInitialized);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut started = 0;
        for context in &self.contexts {
            if context.start_task().is_ok() {
                started += 1;
            }
        }

        log::info!("registry: running {} contexts", started);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Context `id`, if the registry is initialized, `id` is in range and
    /// the context was configured in `init`
    pub fn try_context(&self, id: ContextId) -> Result<&TaskContext<QUEUE>, AsyncError> {
        if !self.is_initialized() {
            return Err(AsyncError::NotInitialized);
        }
        let context = self
            .contexts
            .get(id as usize)
            .ok_or(AsyncError::InvalidContext(id))?;
        if context.state() == TaskState::Uninitialized {
            return Err(AsyncError::InvalidState(id));
        }
        Ok(context)
    }

    /// Context `id`.
    ///
    /// Panics before `init`, for an out-of-range id and for a context
    /// without a configuration.
    pub fn context(&self, id: ContextId) -> &TaskContext<QUEUE> {
        match self.try_context(id) {
            Ok(context) => context,
            Err(err) => panic!("registry: {}", err),
        }
    }

    /// Queue `runnable` in context `id`. Panics if that queue is full.
    pub fn execute(&self, id: ContextId, runnable: RunnableRef) {
        self.context(id).execute(runnable);
    }

    /// Queue `runnable` in context `id`, reporting failures
    pub fn try_execute(&self, id: ContextId, runnable: RunnableRef) -> Result<(), AsyncError> {
        self.try_context(id)?.try_execute(runnable)
    }

    /// One-shot `runnable` in context `id` after `delay` units
    pub fn schedule(
        &self,
        id: ContextId,
        runnable: RunnableRef,
        timeout: &'static Timeout,
        delay: u32,
        unit: TimeUnit,
    ) {
        self.context(id).schedule(runnable, timeout, delay, unit);
    }

    /// Periodic `runnable` in context `id` every `period` units
    pub fn schedule_at_fixed_rate(
        &self,
        id: ContextId,
        runnable: RunnableRef,
        timeout: &'static Timeout,
        period: u32,
        unit: TimeUnit,
    ) {
        self.context(id).schedule_at_fixed_rate(runnable, timeout, period, unit);
    }

    /// Cancel `timeout` in whichever context it was scheduled in.
    ///
    /// Detaches the timeout from its context and unlinks it under one
    /// lock: once any cancel has returned, the timeout cannot fire. A
    /// second cancel finds nothing to do. Safe from any thread.
    pub fn cancel(&self, timeout: &Timeout) -> bool {
        let _lock = Lock::new();
        let id = timeout.take_context();
        match self.contexts.get(id as usize) {
            Some(context) => context.cancel(timeout),
            None => false,
        }
    }

    /// Context of the calling thread, `CONTEXT_INVALID` outside any context
    pub fn current_task_context(&self) -> ContextId {
        current_task_context()
    }

    /// Name of context `id` (`"<undefined>"` if not configured)
    pub fn task_name(&self, id: ContextId) -> &'static str {
        self.contexts
            .get(id as usize)
            .map_or("<undefined>", TaskContext::name)
    }

    /// Stack size and sampled high-water mark of context `id`
    pub fn stack_usage(&self, id: ContextId) -> Option<StackUsage> {
        self.contexts.get(id as usize)?.stack_usage()
    }

    /// Post the stop event to every context
    pub fn stop_all(&self) {
        for context in &self.contexts {
            context.stop_dispatch();
        }
        log::info!("registry: stop requested");
    }

    /// Join every context thread. Returns the number joined.
    pub fn join_all(&self) -> usize {
        self.contexts.iter().filter(|context| context.join()).count()
    }

    pub const fn len(&self) -> usize {
        TASKS
    }

    pub const fn is_empty(&self) -> bool {
        TASKS == 0
    }
}
