//! Hosted one-shot timer — stands in for the RTOS timer handle
//!
//! One helper thread per context sleeps until the armed deadline and then
//! runs the expiry callback (which only posts an event bit). Re-arming
//! replaces the pending deadline; there is never more than one.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<TimerState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-deadline timer backed by a helper thread
pub struct OneShotTimer {
    shared: Arc<Shared>,
}

impl OneShotTimer {
    /// Spawn the helper thread. `on_expiry` runs on that thread.
    pub fn spawn<F>(name: String, on_expiry: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name(name)
            .spawn(move || run(&worker, on_expiry))?;
        Ok(Self { shared })
    }

    /// Fire once, `delay_us` from now. Replaces any pending deadline.
    pub fn arm(&self, delay_us: u64) {
        let mut state = self.shared.lock();
        state.deadline = Some(Instant::now() + Duration::from_micros(delay_us));
        self.shared.changed.notify_one();
    }

    /// Drop the pending deadline, if any
    pub fn disarm(&self) {
        let mut state = self.shared.lock();
        state.deadline = None;
        self.shared.changed.notify_one();
    }

    pub fn is_armed(&self) -> bool {
        self.shared.lock().deadline.is_some()
    }

    /// Stop the helper thread; the timer cannot be armed again
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        state.shutdown = true;
        state.deadline = None;
        self.shared.changed.notify_one();
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: &Shared, on_expiry: impl Fn()) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }
        match state.deadline {
            None => {
                state = shared
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    state.deadline = None;
                    drop(state);
                    on_expiry();
                    state = shared.lock();
                } else {
                    state = shared
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_fires_once_after_delay() {
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        let timer = OneShotTimer::spawn("t-fire".into(), move || {
            let _ = tx.send(Instant::now());
        })
        .unwrap();
        timer.arm(20_000);

        let fired_at = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(fired_at - start >= Duration::from_millis(20));
        assert!(!timer.is_armed());
        // One shot: nothing else arrives
        assert!(rx.recv_timeout(Duration::from_millis(60)).is_err());
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let (tx, rx) = mpsc::channel();
        let timer = OneShotTimer::spawn("t-rearm".into(), move || {
            let _ = tx.send(());
        })
        .unwrap();
        timer.arm(5_000_000);
        timer.arm(1_000);
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_disarm() {
        let (tx, rx) = mpsc::channel();
        let timer = OneShotTimer::spawn("t-disarm".into(), move || {
            let _ = tx.send(());
        })
        .unwrap();
        timer.arm(30_000);
        timer.disarm();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
