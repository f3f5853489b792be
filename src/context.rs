//! Execution context — one thread, one dispatch loop
//!
//! A `TaskContext` combines a runnable executor, a timer engine, an event
//! word and an OS one-shot timer into a single-threaded execution domain.
//! Any thread (or interrupt) may submit work; only the context's own
//! thread ever runs it, so runnables of one context never race each other.
//!
//! Lifecycle: `Uninitialized` → `create_task` → `Initialized` (thread
//! spawned and parked) → `start_task` → `Running` → `stop_dispatch` →
//! `Stopping` → loop exit → `Stopped`. Contexts are never restarted.

use std::cell::Cell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};

use crate::clock::Clock;
use crate::error::AsyncError;
use crate::event::{EventMask, EventWord, RUNNABLE_EVENT, STOP_EVENT, TIMER_EVENT};
use crate::executor::RunnableExecutor;
use crate::hook::ContextHook;
use crate::os_timer::OneShotTimer;
use crate::runnable::RunnableRef;
use crate::stack::{FreezeOnExit, StackMonitor, StackUsage};
use crate::task::{ContextId, TaskConfig, TaskFn, TaskState, CONTEXT_INVALID};
use crate::timeout::{TimeUnit, Timeout};
use crate::timer::{Arm, Timer};

thread_local! {
    static CURRENT_CONTEXT: Cell<ContextId> = const { Cell::new(CONTEXT_INVALID) };
}

/// Context of the calling thread, `CONTEXT_INVALID` outside any context
/// (the hosted equivalent of being called from an interrupt)
pub fn current_task_context() -> ContextId {
    CURRENT_CONTEXT.with(Cell::get)
}

/// One execution context with a runnable queue of `QUEUE` entries
pub struct TaskContext<const QUEUE: usize> {
    context: ContextId,
    name: OnceLock<&'static str>,
    priority: OnceLock<u8>,
    task_function: OnceLock<TaskFn<QUEUE>>,
    executor: RunnableExecutor<QUEUE>,
    timer: Timer,
    events: EventWord,
    os_timer: OnceLock<OneShotTimer>,
    thread: Mutex<Option<JoinHandle<()>>>,
    state: AtomicU8,
    clock: &'static dyn Clock,
    hook: Option<&'static dyn ContextHook>,
    stack: StackMonitor,
}

impl<const QUEUE: usize> TaskContext<QUEUE> {
    pub fn new(
        context: ContextId,
        clock: &'static dyn Clock,
        hook: Option<&'static dyn ContextHook>,
    ) -> Self {
        Self {
            context,
            name: OnceLock::new(),
            priority: OnceLock::new(),
            task_function: OnceLock::new(),
            executor: RunnableExecutor::new(),
            timer: Timer::new(),
            events: EventWord::new(),
            os_timer: OnceLock::new(),
            thread: Mutex::new(None),
            state: AtomicU8::new(TaskState::Uninitialized as u8),
            clock,
            hook,
            stack: StackMonitor::new(),
        }
    }

    /// Bind name and task function, create the OS timer and spawn the
    /// (parked) thread. The thread does nothing until [`start_task`].
    ///
    /// [`start_task`]: TaskContext::start_task
    pub fn create_task(&'static self, config: &TaskConfig<QUEUE>) -> Result<(), AsyncError> {
        self.state
            .compare_exchange(
                TaskState::Uninitialized as u8,
                TaskState::Initialized as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| AsyncError::InvalidState(self.context))?;

        let _ = self.name.set(config.name);
        let _ = self.priority.set(config.priority);
        let _ = self
            .task_function
            .set(config.task_function.unwrap_or(Self::default_task_function));
        self.stack.set_size(config.stack_size);

        let timer = OneShotTimer::spawn(format!("{}-timer", config.name), move || {
            self.timer_expired()
        })
        .map_err(|source| AsyncError::Spawn {
            context: self.context,
            source,
        })?;
        let _ = self.os_timer.set(timer);

        let handle = thread::Builder::new()
            .name(config.name.to_string())
            .stack_size(config.stack_size)
            .spawn(move || self.thread_main())
            .map_err(|source| AsyncError::Spawn {
                context: self.context,
                source,
            })?;
        self.events.bind_owner(handle.thread().clone());
        *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        log::info!("ctx {}: created task '{}'", self.context, config.name);
        Ok(())
    }

    /// Release the parked thread into its task function
    pub fn start_task(&self) -> Result<(), AsyncError> {
        self.state
            .compare_exchange(
                TaskState::Initialized as u8,
                TaskState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| AsyncError::InvalidState(self.context))?;
        self.unpark();
        Ok(())
    }

    fn unpark(&self) {
        let guard = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = guard.as_ref() {
            handle.thread().unpark();
        }
    }

    fn thread_main(&'static self) {
        CURRENT_CONTEXT.with(|current| current.set(self.context));
        self.stack.start();
        let _frozen = FreezeOnExit(&self.stack);
        self.apply_priority();

        while self.state() == TaskState::Initialized {
            thread::park();
        }
        if self.state() == TaskState::Running {
            self.call_task_function();
        }

        self.finish();
    }

    fn apply_priority(&self) {
        let Some(&priority) = self.priority.get() else {
            return;
        };
        match ThreadPriorityValue::try_from(priority) {
            Ok(value) => {
                // Raising priority may need privileges
                if let Err(err) = set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
                    log::debug!(
                        "ctx {}: thread priority {} not applied: {:?}",
                        self.context,
                        priority,
                        err
                    );
                }
            }
            Err(err) => {
                log::debug!("ctx {}: thread priority {}: {}", self.context, priority, err);
            }
        }
    }

    /// Run the bound task function on the calling (context) thread
    pub fn call_task_function(&'static self) {
        let task_function = self
            .task_function
            .get()
            .copied()
            .unwrap_or(Self::default_task_function);
        task_function(self);
    }

    /// Task function used when none is configured
    pub fn default_task_function(context: &'static Self) {
        context.dispatch();
    }

    /// The dispatch loop. Returns once the stop event has been handled.
    pub fn dispatch(&self) {
        debug_assert_eq!(
            current_task_context(),
            self.context,
            "dispatch called off the context thread"
        );
        log::info!("ctx {}: dispatch loop running", self.context);

        self.enter();
        loop {
            self.leave();
            let events = self.events.wait_events();
            self.enter();
            log::trace!("ctx {}: events {:#05b}", self.context, events);

            self.handle_events(events);
            if events & STOP_EVENT != 0 {
                break;
            }
        }
        self.leave();

        self.finish();
    }

    fn handle_events(&self, events: EventMask) {
        if events & RUNNABLE_EVENT != 0 {
            self.executor.process();
        }
        if events & TIMER_EVENT != 0 {
            self.handle_timeout();
        }
    }

    fn handle_timeout(&self) {
        while self.timer.process_next_timeout(self.clock.now_us()) {}
        match self.timer.next_delta(self.clock.now_us()) {
            Some(delta) => self.set_timeout(delta),
            None => {
                if let Some(timer) = self.os_timer.get() {
                    timer.disarm();
                }
            }
        }
    }

    /// Arm the OS one-shot timer; a zero delay posts the timer event directly
    pub fn set_timeout(&self, delay_us: u64) {
        if delay_us == 0 {
            self.events.set_events(TIMER_EVENT);
        } else if let Some(timer) = self.os_timer.get() {
            timer.arm(delay_us);
        }
    }

    /// OS timer expiry: hand timer servicing to the dispatch loop
    pub fn timer_expired(&self) {
        self.events.set_events(TIMER_EVENT);
    }

    fn finish(&self) {
        let previous = self.state.swap(TaskState::Stopped as u8, Ordering::AcqRel);
        if previous != TaskState::Stopped as u8 {
            if let Some(timer) = self.os_timer.get() {
                timer.shutdown();
            }
            log::info!("ctx {}: stopped", self.context);
        }
    }

    fn enter(&self) {
        self.stack.sample();
        if let Some(hook) = self.hook {
            hook.enter_task(self.context);
        }
    }

    fn leave(&self) {
        if let Some(hook) = self.hook {
            hook.leave_task(self.context);
        }
    }

    /// Queue `runnable` for this context.
    ///
    /// Panics if the queue is full: sizing queues for the worst case is the
    /// caller's job. After `stop_dispatch` the runnable is dropped.
    pub fn execute(&self, runnable: RunnableRef) {
        match self.try_execute(runnable) {
            Ok(()) => {}
            Err(AsyncError::ShutDown) => {
                log::debug!("ctx {}: shut down, runnable dropped", self.context);
            }
            Err(err) => {
                log::error!("ctx {}: {}", self.context, err);
                panic!("ctx {}: {}", self.context, err);
            }
        }
    }

    /// Queue `runnable`, handing queue overflow back to the caller
    pub fn try_execute(&self, runnable: RunnableRef) -> Result<(), AsyncError> {
        if self.executor.enqueue(runnable)? {
            self.events.set_events(RUNNABLE_EVENT);
        }
        Ok(())
    }

    /// Run `runnable` once, `delay` units from now.
    ///
    /// Ignored if `timeout` is already active anywhere; cancel first to
    /// change its parameters.
    pub fn schedule(
        &self,
        runnable: RunnableRef,
        timeout: &'static Timeout,
        delay: u32,
        unit: TimeUnit,
    ) {
        let arm = self.timer.set(
            timeout,
            runnable,
            self.context,
            unit.to_micros(delay),
            self.clock.now_us(),
        );
        self.after_arm(arm);
    }

    /// Run `runnable` every `period` units, first after one period.
    ///
    /// Same first-scheduler-wins rule as [`schedule`](Self::schedule).
    pub fn schedule_at_fixed_rate(
        &self,
        runnable: RunnableRef,
        timeout: &'static Timeout,
        period: u32,
        unit: TimeUnit,
    ) {
        let arm = self.timer.set_cyclic(
            timeout,
            runnable,
            self.context,
            unit.to_micros(period),
            self.clock.now_us(),
        );
        self.after_arm(arm);
    }

    fn after_arm(&self, arm: Arm) {
        match arm {
            Arm::Earliest => self.events.set_events(TIMER_EVENT),
            Arm::Queued => {}
            Arm::Ignored => {
                log::debug!("ctx {}: timeout already active, schedule ignored", self.context);
            }
        }
    }

    /// Cancel `timeout` if it is armed in this context
    pub fn cancel(&self, timeout: &Timeout) -> bool {
        self.timer.cancel(timeout)
    }

    /// Shut the executor down and post the stop event
    pub fn stop_dispatch(&self) {
        self.executor.shutdown();
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match TaskState::from_u8(raw) {
                    TaskState::Initialized | TaskState::Running => {
                        Some(TaskState::Stopping as u8)
                    }
                    _ => None,
                }
            });
        self.events.set_events(STOP_EVENT);
    }

    /// Wait for the context thread to exit. Returns false if there is no
    /// thread to join (never created, already joined, or called from the
    /// context's own thread).
    pub fn join(&self) -> bool {
        if current_task_context() == self.context {
            return false;
        }
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    log::error!("ctx {}: thread panicked", self.context);
                }
                true
            }
            None => false,
        }
    }

    /// Configured stack size and high-water mark, covering everything run
    /// on the thread so far; `None` before the thread has run.
    ///
    /// Stacks too small to paint (see [`crate::stack`]) only report the
    /// depth seen at dispatch wake-ups, a lower bound.
    pub fn stack_usage(&self) -> Option<StackUsage> {
        self.stack.usage()
    }

    pub fn id(&self) -> ContextId {
        self.context
    }

    /// Task name, `"<undefined>"` before `create_task`
    pub fn name(&self) -> &'static str {
        self.name.get().copied().unwrap_or("<undefined>")
    }

    /// Configured thread priority, `None` before `create_task`
    pub fn priority(&self) -> Option<u8> {
        self.priority.get().copied()
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Runnables waiting in the queue
    pub fn pending_runnables(&self) -> usize {
        self.executor.pending()
    }

    /// Timeouts armed in this context
    pub fn active_timeouts(&self) -> usize {
        self.timer.active_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{system_clock, SoftwareClock};
    use crate::hook::RuntimeStatistics;
    use crate::runnable::Runnable;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc::{self, Receiver, SyncSender};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(50);

    type Ctx = TaskContext<8>;

    fn leak<T>(value: T) -> &'static T {
        Box::leak(Box::new(value))
    }

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn started(id: ContextId, clock: &'static dyn Clock) -> &'static Ctx {
        init_logger();
        let ctx = leak(Ctx::new(id, clock, None));
        ctx.create_task(&TaskConfig::new(id, "test")).unwrap();
        ctx.start_task().unwrap();
        ctx
    }

    fn stop(ctx: &'static Ctx) {
        ctx.stop_dispatch();
        assert!(ctx.join());
        assert_eq!(ctx.state(), TaskState::Stopped);
    }

    /// Reports (tag, context it ran in)
    struct Report {
        tag: u32,
        tx: SyncSender<(u32, ContextId)>,
    }

    impl Runnable for Report {
        fn execute(&self) {
            let _ = self.tx.send((self.tag, current_task_context()));
        }
    }

    fn reporters(n: u32) -> (Vec<RunnableRef>, Receiver<(u32, ContextId)>) {
        let (tx, rx) = mpsc::sync_channel(64);
        let runnables = (0..n)
            .map(|tag| leak(Report { tag, tx: tx.clone() }) as RunnableRef)
            .collect();
        (runnables, rx)
    }

    #[test]
    fn test_execute_runs_fifo_on_context_thread() {
        let ctx = started(3, system_clock());
        let (runnables, rx) = reporters(6);
        for &runnable in &runnables {
            ctx.execute(runnable);
        }
        for expected in 0..6 {
            assert_eq!(rx.recv_timeout(WAIT).unwrap(), (expected, 3));
        }
        assert!(rx.recv_timeout(QUIET).is_err());
        assert_eq!(current_task_context(), CONTEXT_INVALID);
        stop(ctx);
    }

    #[test]
    fn test_execute_before_start_runs_after_start() {
        init_logger();
        let ctx = leak(Ctx::new(0, system_clock(), None));
        ctx.create_task(&TaskConfig::new(0, "late")).unwrap();
        let (runnables, rx) = reporters(2);
        ctx.execute(runnables[0]);
        ctx.execute(runnables[1]);
        assert!(rx.recv_timeout(QUIET).is_err());

        ctx.start_task().unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap().0, 0);
        assert_eq!(rx.recv_timeout(WAIT).unwrap().0, 1);
        stop(ctx);
    }

    /// Blocks the context until the test releases it
    struct Gate {
        entered: SyncSender<()>,
        release: Mutex<Receiver<()>>,
        tx: SyncSender<(u32, ContextId)>,
    }

    impl Runnable for Gate {
        fn execute(&self) {
            self.entered.send(()).unwrap();
            let _ = self.release.lock().unwrap().recv_timeout(WAIT);
            let _ = self.tx.send((100, current_task_context()));
        }
    }

    #[test]
    fn test_interrupt_enqueue_while_processing() {
        let ctx = started(1, system_clock());
        let (runnables, rx) = reporters(3);
        let (entered_tx, entered_rx) = mpsc::sync_channel(1);
        let (release_tx, release_rx) = mpsc::sync_channel(1);
        let (gate_tx, gate_rx) = mpsc::sync_channel(4);
        let gate = leak(Gate {
            entered: entered_tx,
            release: Mutex::new(release_rx),
            tx: gate_tx,
        });

        ctx.execute(gate);
        entered_rx.recv_timeout(WAIT).unwrap();

        // "Interrupt": a foreign thread submits while the gate is running
        let isr = thread::spawn(move || {
            assert_eq!(current_task_context(), CONTEXT_INVALID);
            for runnable in runnables {
                ctx.execute(runnable);
            }
        });
        isr.join().unwrap();
        release_tx.send(()).unwrap();

        assert_eq!(gate_rx.recv_timeout(WAIT).unwrap(), (100, 1));
        for expected in 0..3 {
            assert_eq!(rx.recv_timeout(WAIT).unwrap(), (expected, 1));
        }
        stop(ctx);
    }

    #[test]
    fn test_timeouts_follow_the_clock() {
        let clock = leak(SoftwareClock::new());
        let ctx = started(2, clock);
        let (runnables, rx) = reporters(2);
        let one_shot = leak(Timeout::new());
        let periodic = leak(Timeout::new());

        ctx.schedule(runnables[0], one_shot, 50, TimeUnit::Milliseconds);
        ctx.schedule_at_fixed_rate(runnables[1], periodic, 20, TimeUnit::Milliseconds);
        assert_eq!(one_shot.context(), 2);
        assert_eq!(ctx.active_timeouts(), 2);

        let mut fired = Vec::new();
        for ms in [10u64, 20, 30, 40, 50, 60, 70, 80, 90, 100] {
            clock.set(ms * 1000);
            ctx.timer_expired();
            if ms % 20 == 0 {
                let (tag, in_ctx) = rx.recv_timeout(WAIT).unwrap();
                assert_eq!(in_ctx, 2);
                fired.push((tag, ms));
            }
            if ms == 50 {
                fired.push((rx.recv_timeout(WAIT).unwrap().0, ms));
            }
        }
        assert!(rx.recv_timeout(QUIET).is_err());
        assert_eq!(
            fired,
            vec![(1, 20), (1, 40), (0, 50), (1, 60), (1, 80), (1, 100)]
        );
        assert!(!one_shot.is_active());
        assert!(periodic.is_active());
        assert!(ctx.cancel(periodic));
        stop(ctx);
    }

    #[test]
    fn test_never_fires_early_in_real_time() {
        let ctx = started(4, system_clock());
        let (runnables, rx) = reporters(1);
        let timeout = leak(Timeout::new());
        let start = std::time::Instant::now();
        ctx.schedule(runnables[0], timeout, 30, TimeUnit::Milliseconds);
        rx.recv_timeout(WAIT).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
        stop(ctx);
    }

    #[test]
    fn test_cancel_before_deadline_prevents_firing() {
        let clock = leak(SoftwareClock::new());
        let ctx = started(5, clock);
        let (runnables, rx) = reporters(1);
        let timeout = leak(Timeout::new());
        ctx.schedule(runnables[0], timeout, 10, TimeUnit::Milliseconds);
        assert!(ctx.cancel(timeout));
        assert!(!ctx.cancel(timeout));

        clock.set(20_000);
        ctx.timer_expired();
        assert!(rx.recv_timeout(QUIET).is_err());
        stop(ctx);
    }

    #[test]
    fn test_stop_is_terminal() {
        let ctx = started(6, system_clock());
        let (runnables, rx) = reporters(1);
        stop(ctx);

        // Dropped, not panicking
        ctx.execute(runnables[0]);
        assert!(rx.recv_timeout(QUIET).is_err());
        assert!(matches!(ctx.try_execute(runnables[0]), Err(AsyncError::ShutDown)));
        assert!(ctx.start_task().is_err());
        assert!(!ctx.join());
    }

    #[test]
    fn test_stop_before_start() {
        init_logger();
        let ctx = leak(Ctx::new(0, system_clock(), None));
        ctx.create_task(&TaskConfig::new(0, "never")).unwrap();
        stop(ctx);
    }

    static HELD_ENTERED: AtomicBool = AtomicBool::new(false);
    static HELD_RELEASED: AtomicBool = AtomicBool::new(false);

    /// Holds the thread back from dispatching until released
    fn held_task(ctx: &'static Ctx) {
        HELD_ENTERED.store(true, Ordering::Release);
        while !HELD_RELEASED.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
        ctx.dispatch();
    }

    #[test]
    fn test_stop_handled_after_other_events_of_same_cycle() {
        init_logger();
        let clock = leak(SoftwareClock::new());
        let ctx = leak(Ctx::new(8, clock, None));
        ctx.create_task(&TaskConfig::new(8, "held").with_task_function(held_task))
            .unwrap();
        ctx.start_task().unwrap();
        while !HELD_ENTERED.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }

        // Timer bit and stop bit land in the same wait
        let (runnables, rx) = reporters(1);
        let timeout = leak(Timeout::new());
        ctx.schedule(runnables[0], timeout, 0, TimeUnit::Milliseconds);
        ctx.stop_dispatch();
        assert_eq!(ctx.state(), TaskState::Stopping);
        HELD_RELEASED.store(true, Ordering::Release);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), (0, 8));
        assert!(ctx.join());
        assert_eq!(ctx.state(), TaskState::Stopped);
        assert!(!timeout.is_active());
    }

    #[test]
    fn test_try_execute_reports_full_queue() {
        let ctx = leak(TaskContext::<2>::new(0, system_clock(), None));
        let (runnables, _rx) = reporters(3);
        ctx.try_execute(runnables[0]).unwrap();
        ctx.try_execute(runnables[1]).unwrap();
        assert!(matches!(
            ctx.try_execute(runnables[2]),
            Err(AsyncError::QueueFull { capacity: 2 })
        ));
        assert_eq!(ctx.pending_runnables(), 2);
    }

    #[test]
    #[should_panic(expected = "runnable queue full")]
    fn test_execute_panics_on_full_queue() {
        let ctx = leak(TaskContext::<1>::new(0, system_clock(), None));
        let (runnables, _rx) = reporters(2);
        ctx.execute(runnables[0]);
        ctx.execute(runnables[1]);
    }

    #[test]
    fn test_create_twice_is_rejected() {
        init_logger();
        let ctx = leak(Ctx::new(0, system_clock(), None));
        assert_eq!(ctx.name(), "<undefined>");
        ctx.create_task(&TaskConfig::new(0, "once")).unwrap();
        assert_eq!(ctx.name(), "once");
        assert_eq!(ctx.priority(), Some(crate::task::default_priority(0)));
        assert!(matches!(
            ctx.create_task(&TaskConfig::new(0, "twice")),
            Err(AsyncError::InvalidState(0))
        ));
        stop(ctx);
    }

    static SETUP_RAN: Mutex<Vec<ContextId>> = Mutex::new(Vec::new());

    fn custom_task(ctx: &'static Ctx) {
        SETUP_RAN.lock().unwrap().push(current_task_context());
        ctx.dispatch();
    }

    #[test]
    fn test_custom_task_function() {
        init_logger();
        let ctx = leak(Ctx::new(7, system_clock(), None));
        ctx.create_task(&TaskConfig::new(7, "custom").with_task_function(custom_task))
            .unwrap();
        ctx.start_task().unwrap();

        let (runnables, rx) = reporters(1);
        ctx.execute(runnables[0]);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), (0, 7));
        assert!(SETUP_RAN.lock().unwrap().contains(&7));
        stop(ctx);
    }

    #[test]
    fn test_stack_usage_reported_after_start() {
        init_logger();
        let ctx = leak(Ctx::new(0, system_clock(), None));
        assert!(ctx.stack_usage().is_none());
        ctx.create_task(&TaskConfig::new(0, "stack").with_stack_size(256 * 1024))
            .unwrap();
        ctx.start_task().unwrap();

        let (runnables, rx) = reporters(1);
        ctx.execute(runnables[0]);
        rx.recv_timeout(WAIT).unwrap();

        let usage = ctx.stack_usage().unwrap();
        assert_eq!(usage.stack_size, 256 * 1024);
        assert!(usage.used_size < usage.stack_size);
        stop(ctx);
    }

    const DEEP_FRAME: usize = 256 * 1024;

    struct DeepFrame {
        tx: SyncSender<()>,
    }

    impl Runnable for DeepFrame {
        fn execute(&self) {
            let mut frame = [1u8; DEEP_FRAME];
            core::hint::black_box(&mut frame);
            let _ = self.tx.send(());
        }
    }

    #[test]
    fn test_stack_usage_sees_runnable_frames() {
        init_logger();
        let ctx = leak(Ctx::new(0, system_clock(), None));
        ctx.create_task(&TaskConfig::new(0, "deep").with_stack_size(1024 * 1024))
            .unwrap();
        ctx.start_task().unwrap();

        let (tx, rx) = mpsc::sync_channel(1);
        ctx.execute(leak(DeepFrame { tx }));
        rx.recv_timeout(WAIT).unwrap();

        let usage = ctx.stack_usage().unwrap();
        assert!(usage.used_size >= DEEP_FRAME);
        assert!(usage.used_size < usage.stack_size);

        // Still reported once the thread has exited
        stop(ctx);
        assert!(ctx.stack_usage().unwrap().used_size >= DEEP_FRAME);
    }

    #[test]
    fn test_hook_sees_activity() {
        init_logger();
        let stats = leak(RuntimeStatistics::<1, 0>::new(system_clock()));
        let ctx = leak(Ctx::new(0, system_clock(), Some(stats)));
        ctx.create_task(&TaskConfig::new(0, "hooked")).unwrap();
        ctx.start_task().unwrap();

        let (runnables, rx) = reporters(1);
        ctx.execute(runnables[0]);
        rx.recv_timeout(WAIT).unwrap();
        stop(ctx);

        let snapshot = stats.snapshot(0);
        assert!(snapshot.activations >= 2);
        assert!(!snapshot.is_busy());
    }
}
