//! Tick-driven countdown

use discipline_util::{DateTime, Duration};

/// A countdown that only moves when it is synchronized.
///
/// Each call to [`Countdown::synchronize`] subtracts the wall-clock time since
/// the previous call, so the remaining duration is correct no matter how
/// irregular the ticks are. Time going backwards counts as no time at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    remaining_duration: Duration,
    previous_synchronization_time: DateTime,
}

impl Countdown {
    pub fn new(duration: Duration, now: DateTime) -> Self {
        Self {
            remaining_duration: duration,
            previous_synchronization_time: now,
        }
    }

    /// Rebuild from persisted fields
    pub fn construct(remaining_duration: Duration, previous_synchronization_time: DateTime) -> Self {
        Self {
            remaining_duration,
            previous_synchronization_time,
        }
    }

    pub fn remaining_duration(&self) -> Duration {
        self.remaining_duration
    }

    pub fn previous_synchronization_time(&self) -> DateTime {
        self.previous_synchronization_time
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_duration.is_zero()
    }

    pub fn synchronize(&mut self, now: DateTime) {
        let elapsed = self.previous_synchronization_time.till_or_zero(now);
        self.remaining_duration = self.remaining_duration.minus_or_zero(elapsed);
        self.previous_synchronization_time = now;
    }
}
