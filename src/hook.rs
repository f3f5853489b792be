//! Context hooks and runtime statistics
//!
//! A dispatch loop reports when it becomes busy (`enter_task`: thread
//! start, wake-up from the event wait) and when it goes idle again
//! (`leave_task`: back into the wait, loop exit). Interrupt handlers are
//! grouped by the application and report their own edges through
//! `enter_isr_group` / `leave_isr_group`. [`RuntimeStatistics`] turns
//! both kinds of edges into load figures.

use core::cell::Cell;

use critical_section::Mutex;

use crate::clock::Clock;
use crate::task::ContextId;

/// Observer of dispatch-loop and interrupt busy/idle transitions
pub trait ContextHook: Sync {
    fn enter_task(&self, context: ContextId);
    fn leave_task(&self, context: ContextId);

    /// An interrupt handler of `group` started
    fn enter_isr_group(&self, _group: usize) {}

    /// An interrupt handler of `group` finished
    fn leave_isr_group(&self, _group: usize) {}
}

/// Load figures for one context or interrupt group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskStatistics {
    /// Number of busy periods
    pub activations: u32,
    /// Accumulated busy time (µs)
    pub total_us: u64,
    /// Longest single busy period (µs)
    pub max_us: u64,
    /// Start of the current busy period, if busy
    entered_at: Option<u64>,
}

impl TaskStatistics {
    const EMPTY: TaskStatistics = TaskStatistics {
        activations: 0,
        total_us: 0,
        max_us: 0,
        entered_at: None,
    };

    /// Is the context currently busy?
    pub fn is_busy(&self) -> bool {
        self.entered_at.is_some()
    }

    /// Mean busy period (µs)
    pub fn average_us(&self) -> u64 {
        if self.activations == 0 {
            0
        } else {
            self.total_us / self.activations as u64
        }
    }
}

type Entry = Mutex<Cell<TaskStatistics>>;

/// Runtime monitor for `TASKS` contexts and `ISR_GROUPS` interrupt groups
pub struct RuntimeStatistics<const TASKS: usize, const ISR_GROUPS: usize> {
    clock: &'static dyn Clock,
    tasks: [Entry; TASKS],
    isr_groups: [Entry; ISR_GROUPS],
}

impl<const TASKS: usize, const ISR_GROUPS: usize> RuntimeStatistics<TASKS, ISR_GROUPS> {
    pub fn new(clock: &'static dyn Clock) -> Self {
        Self {
            clock,
            tasks: core::array::from_fn(|_| Mutex::new(Cell::new(TaskStatistics::EMPTY))),
            isr_groups: core::array::from_fn(|_| Mutex::new(Cell::new(TaskStatistics::EMPTY))),
        }
    }

    /// Current figures for `context` (all zero for unknown ids)
    pub fn snapshot(&self, context: ContextId) -> TaskStatistics {
        read(self.tasks.get(context as usize))
    }

    /// Current figures for interrupt `group` (all zero for unknown groups)
    pub fn isr_snapshot(&self, group: usize) -> TaskStatistics {
        read(self.isr_groups.get(group))
    }

    /// Clear accumulated figures; a busy period in progress keeps running
    pub fn reset(&self) {
        critical_section::with(|cs| {
            for entry in self.tasks.iter().chain(&self.isr_groups) {
                let cell = entry.borrow(cs);
                let entered_at = cell.get().entered_at;
                cell.set(TaskStatistics {
                    entered_at,
                    ..TaskStatistics::EMPTY
                });
            }
        });
    }

    fn enter(&self, entry: Option<&Entry>) {
        self.update(entry, |stats, now| {
            if stats.entered_at.is_none() {
                stats.entered_at = Some(now);
                stats.activations = stats.activations.wrapping_add(1);
            }
        });
    }

    fn leave(&self, entry: Option<&Entry>) {
        self.update(entry, |stats, now| {
            if let Some(entered_at) = stats.entered_at.take() {
                let busy = now.saturating_sub(entered_at);
                stats.total_us = stats.total_us.saturating_add(busy);
                stats.max_us = stats.max_us.max(busy);
            }
        });
    }

    fn update(&self, entry: Option<&Entry>, f: impl FnOnce(&mut TaskStatistics, u64)) {
        let Some(entry) = entry else {
            return;
        };
        let now = self.clock.now_us();
        critical_section::with(|cs| {
            let cell = entry.borrow(cs);
            let mut stats = cell.get();
            f(&mut stats, now);
            cell.set(stats);
        });
    }
}

fn read(entry: Option<&Entry>) -> TaskStatistics {
    entry
        .map(|entry| critical_section::with(|cs| entry.borrow(cs).get()))
        .unwrap_or_default()
}

impl<const TASKS: usize, const ISR_GROUPS: usize> ContextHook
    for RuntimeStatistics<TASKS, ISR_GROUPS>
{
    fn enter_task(&self, context: ContextId) {
        self.enter(self.tasks.get(context as usize));
    }

    fn leave_task(&self, context: ContextId) {
        self.leave(self.tasks.get(context as usize));
    }

    fn enter_isr_group(&self, group: usize) {
        self.enter(self.isr_groups.get(group));
    }

    fn leave_isr_group(&self, group: usize) {
        self.leave(self.isr_groups.get(group));
    }
}
