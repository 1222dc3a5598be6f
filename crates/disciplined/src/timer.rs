//! Interval timers for the tick loop

use discipline_util::Duration;
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Shortest period a timer will run at
const MIN_PERIOD_MS: u64 = 1;

/// Identifies a registered timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// Runs callbacks periodically until cleared
pub trait IntervalScheduler {
    /// Call `callback` every `period`, starting one period from now
    fn register(&mut self, period: Duration, callback: TimerCallback) -> TimerHandle;

    /// Stop a timer. Returns false if it was not registered.
    fn clear(&mut self, handle: TimerHandle) -> bool;
}

/// Scheduler backed by one tokio task per timer
#[derive(Default)]
pub struct TokioScheduler {
    next_id: u64,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_timers(&self) -> usize {
        self.tasks.len()
    }
}

impl IntervalScheduler for TokioScheduler {
    fn register(&mut self, period: Duration, mut callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;

        let period = std::time::Duration::from_millis(period.milliseconds().max(MIN_PERIOD_MS));
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                callback();
            }
        });

        debug!(timer = handle.0, period_ms = period.as_millis() as u64, "Timer registered");
        self.tasks.insert(handle, task);
        handle
    }

    fn clear(&mut self, handle: TimerHandle) -> bool {
        match self.tasks.remove(&handle) {
            Some(task) => {
                task.abort();
                debug!(timer = handle.0, "Timer cleared");
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}
