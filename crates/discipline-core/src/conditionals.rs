//! Conditionals: the predicates rules are built from
//!
//! - [`AlwaysConditional`]: always effective
//! - [`TimeConditional`]: effective inside a weekly time window
//! - [`CountdownConditional`]: effective while a started countdown runs
//! - [`CountdownAfterPleaConditional`]: effective until a plea's grace period runs out

use discipline_util::{DateTime, Duration, Time, TimeRange, Weekday, WeekdaySet};

use crate::Countdown;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysConditional;

impl AlwaysConditional {
    pub fn new() -> Self {
        Self
    }

    pub fn is_effective(&self) -> bool {
        true
    }
}

/// Effective on the given weekdays while the time of day is inside the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeConditional {
    weekdays: WeekdaySet,
    time_range: TimeRange,
}

impl TimeConditional {
    pub fn new(weekdays: WeekdaySet, time_range: TimeRange) -> Self {
        Self {
            weekdays,
            time_range,
        }
    }

    pub fn weekdays(&self) -> WeekdaySet {
        self.weekdays
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    pub fn is_effective(&self, weekday: Weekday, time: Time) -> bool {
        self.weekdays.contains(weekday) && self.time_range.contains(time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownState {
    Idle,
    Running { countdown: Countdown },
}

/// Effective from [`CountdownConditional::start`] until its countdown
/// finishes, then idle again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownConditional {
    duration: Duration,
    state: CountdownState,
}

impl CountdownConditional {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            state: CountdownState::Idle,
        }
    }

    /// Rebuild from persisted fields. A countdown that already ran out
    /// comes back as idle.
    pub fn from_fields(duration: Duration, countdown: Option<Countdown>) -> Self {
        let state = match countdown {
            Some(countdown) if !countdown.is_finished() => CountdownState::Running { countdown },
            _ => CountdownState::Idle,
        };
        Self { duration, state }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn state(&self) -> &CountdownState {
        &self.state
    }

    pub fn countdown(&self) -> Option<&Countdown> {
        match &self.state {
            CountdownState::Idle => None,
            CountdownState::Running { countdown } => Some(countdown),
        }
    }

    pub fn is_effective(&self) -> bool {
        matches!(self.state, CountdownState::Running { .. })
    }

    /// Start (or restart) a full-length countdown at `now`.
    pub fn start(&mut self, now: DateTime) {
        self.state = CountdownState::Running {
            countdown: Countdown::new(self.duration, now),
        };
    }

    pub fn synchronize(&mut self, now: DateTime) {
        if let CountdownState::Running { countdown } = &mut self.state {
            countdown.synchronize(now);
            if countdown.is_finished() {
                self.state = CountdownState::Idle;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PleaStatus {
    Activated,
    Deactivating { countdown: Countdown },
    Deactivated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateOutcome {
    AlreadyActivated,
    /// An in-flight grace period was cancelled
    CancelledDeactivation,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivateOutcome {
    AlreadyDeactivating,
    AlreadyDeactivated,
    Success,
}

/// Protects until a plea is made, then keeps protecting for the grace
/// period before lifting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownAfterPleaConditional {
    duration: Duration,
    status: PleaStatus,
}

impl CountdownAfterPleaConditional {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            status: PleaStatus::Activated,
        }
    }

    /// Rebuild from persisted fields. A grace period that already ran out
    /// comes back as deactivated.
    pub fn from_status(duration: Duration, status: PleaStatus) -> Self {
        let status = match status {
            PleaStatus::Deactivating { countdown } if countdown.is_finished() => {
                PleaStatus::Deactivated
            }
            other => other,
        };
        Self { duration, status }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn status(&self) -> &PleaStatus {
        &self.status
    }

    pub fn is_activated(&self) -> bool {
        matches!(self.status, PleaStatus::Activated)
    }

    pub fn is_deactivating(&self) -> bool {
        matches!(self.status, PleaStatus::Deactivating { .. })
    }

    pub fn is_deactivated(&self) -> bool {
        matches!(self.status, PleaStatus::Deactivated)
    }

    pub fn is_activated_or_deactivating(&self) -> bool {
        !self.is_deactivated()
    }

    pub fn is_effective(&self) -> bool {
        self.is_activated_or_deactivating()
    }

    /// Grace time left, if a plea is in progress
    pub fn remaining_duration(&self) -> Option<Duration> {
        match &self.status {
            PleaStatus::Deactivating { countdown } => Some(countdown.remaining_duration()),
            _ => None,
        }
    }

    pub fn activate(&mut self) -> ActivateOutcome {
        let outcome = match self.status {
            PleaStatus::Activated => ActivateOutcome::AlreadyActivated,
            PleaStatus::Deactivating { .. } => ActivateOutcome::CancelledDeactivation,
            PleaStatus::Deactivated => ActivateOutcome::Success,
        };
        self.status = PleaStatus::Activated;
        outcome
    }

    pub fn deactivate(&mut self, now: DateTime) -> DeactivateOutcome {
        match self.status {
            PleaStatus::Activated => {
                self.status = PleaStatus::Deactivating {
                    countdown: Countdown::new(self.duration, now),
                };
                DeactivateOutcome::Success
            }
            PleaStatus::Deactivating { .. } => DeactivateOutcome::AlreadyDeactivating,
            PleaStatus::Deactivated => DeactivateOutcome::AlreadyDeactivated,
        }
    }

    pub fn synchronize(&mut self, now: DateTime) {
        if let PleaStatus::Deactivating { countdown } = &mut self.status {
            countdown.synchronize(now);
            if countdown.is_finished() {
                self.status = PleaStatus::Deactivated;
            }
        }
    }
}
