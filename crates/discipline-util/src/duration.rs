//! Non-negative millisecond durations
//!
//! `Duration` is bounded by [`Duration::MAX`], the largest integer that the
//! persisted JSON records can carry without losing precision.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::format_duration;

pub const MILLISECONDS_PER_SECOND: u64 = 1000;
pub const MILLISECONDS_PER_MINUTE: u64 = MILLISECONDS_PER_SECOND * 60;
pub const MILLISECONDS_PER_HOUR: u64 = MILLISECONDS_PER_MINUTE * 60;
pub const MILLISECONDS_PER_DAY: u64 = MILLISECONDS_PER_HOUR * 24;

/// Errors from the validated `Duration` constructors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("Duration cannot be negative (got {0} milliseconds)")]
    Negative(i64),

    #[error("Duration of {value} {unit} exceeds the maximum of {maximum} {unit}")]
    TooLarge {
        unit: &'static str,
        value: u64,
        maximum: u64,
    },
}

/// A non-negative span of time with millisecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration {
    milliseconds: u64,
}

impl Duration {
    /// 2^53 - 1
    pub const MAX_MILLISECONDS: u64 = 9_007_199_254_740_991;

    pub const ZERO: Duration = Duration { milliseconds: 0 };
    pub const MAX: Duration = Duration {
        milliseconds: Self::MAX_MILLISECONDS,
    };

    pub fn from_milliseconds(milliseconds: u64) -> Result<Self, DurationError> {
        Self::from_unit(milliseconds, 1, "milliseconds")
    }

    /// Build from a signed count, as found in untrusted persisted data
    pub fn from_signed_milliseconds(milliseconds: i64) -> Result<Self, DurationError> {
        if milliseconds < 0 {
            return Err(DurationError::Negative(milliseconds));
        }
        Self::from_milliseconds(milliseconds as u64)
    }

    pub fn from_seconds(seconds: u64) -> Result<Self, DurationError> {
        Self::from_unit(seconds, MILLISECONDS_PER_SECOND, "seconds")
    }

    pub fn from_minutes(minutes: u64) -> Result<Self, DurationError> {
        Self::from_unit(minutes, MILLISECONDS_PER_MINUTE, "minutes")
    }

    pub fn from_hours(hours: u64) -> Result<Self, DurationError> {
        Self::from_unit(hours, MILLISECONDS_PER_HOUR, "hours")
    }

    /// Clamp to `MAX` instead of failing. Used for differences between
    /// timestamps, which can exceed the persisted range.
    pub fn saturating_from_milliseconds(milliseconds: u64) -> Self {
        Self {
            milliseconds: milliseconds.min(Self::MAX_MILLISECONDS),
        }
    }

    fn from_unit(value: u64, factor: u64, unit: &'static str) -> Result<Self, DurationError> {
        let maximum = Self::MAX_MILLISECONDS / factor;
        if value > maximum {
            return Err(DurationError::TooLarge {
                unit,
                value,
                maximum,
            });
        }
        Ok(Self {
            milliseconds: value * factor,
        })
    }

    pub fn milliseconds(self) -> u64 {
        self.milliseconds
    }

    pub fn is_zero(self) -> bool {
        self.milliseconds == 0
    }

    /// `self - rhs`, or zero if `rhs` is longer
    pub fn minus_or_zero(self, rhs: Duration) -> Duration {
        Self {
            milliseconds: self.milliseconds.saturating_sub(rhs.milliseconds),
        }
    }

    /// `self + rhs`, clamped to `MAX`
    pub fn plus_or_max(self, rhs: Duration) -> Duration {
        Self::saturating_from_milliseconds(self.milliseconds.saturating_add(rhs.milliseconds))
    }

    pub fn as_std(self) -> std::time::Duration {
        std::time::Duration::from_millis(self.milliseconds)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(duration: Duration) -> Self {
        duration.as_std()
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_duration(self.as_std()))
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.milliseconds.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let milliseconds = u64::deserialize(deserializer)?;
        Duration::from_milliseconds(milliseconds).map_err(serde::de::Error::custom)
    }
}
