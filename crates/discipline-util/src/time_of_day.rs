//! Time of day with millisecond precision

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::{MILLISECONDS_PER_HOUR, MILLISECONDS_PER_MINUTE};

/// Which clock convention an hour was given in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourClock {
    H24,
    Am,
    Pm,
}

impl HourClock {
    fn maximum_hour(self) -> u8 {
        match self {
            HourClock::H24 => 23,
            HourClock::Am | HourClock::Pm => 11,
        }
    }
}

impl fmt::Display for HourClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HourClock::H24 => write!(f, "24-hour"),
            HourClock::Am => write!(f, "AM"),
            HourClock::Pm => write!(f, "PM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("Timestamp {timestamp} is greater than the maximum of {maximum} milliseconds since midnight")]
    TimestampOutOfRange { timestamp: u32, maximum: u32 },

    #[error("Hour {hour} is out of range for the {clock} clock (0-{maximum})")]
    HourOutOfRange {
        hour: u8,
        clock: HourClock,
        maximum: u8,
    },

    #[error("Minute {minute} is out of range (0-59)")]
    MinuteOutOfRange { minute: u8 },
}

/// Milliseconds since midnight, in `[0, 86_399_999]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    timestamp: u32,
}

impl Time {
    pub const MAXIMUM_TIMESTAMP: u32 = 1000 * 60 * 60 * 24 - 1;

    pub const MIDNIGHT: Time = Time { timestamp: 0 };

    pub fn from_millisecond_timestamp(timestamp: u32) -> Result<Self, TimeError> {
        if timestamp > Self::MAXIMUM_TIMESTAMP {
            return Err(TimeError::TimestampOutOfRange {
                timestamp,
                maximum: Self::MAXIMUM_TIMESTAMP,
            });
        }
        Ok(Self { timestamp })
    }

    /// 24-hour clock: hour in 0-23
    pub fn from_hour_and_minute(hour: u8, minute: u8) -> Result<Self, TimeError> {
        Self::from_clock(hour, minute, HourClock::H24)
    }

    /// Morning hour in 0-11
    pub fn from_hour_and_minute_am(hour: u8, minute: u8) -> Result<Self, TimeError> {
        Self::from_clock(hour, minute, HourClock::Am)
    }

    /// Afternoon hour in 0-11, where 0 is noon
    pub fn from_hour_and_minute_pm(hour: u8, minute: u8) -> Result<Self, TimeError> {
        Self::from_clock(hour, minute, HourClock::Pm)
    }

    fn from_clock(hour: u8, minute: u8, clock: HourClock) -> Result<Self, TimeError> {
        let maximum = clock.maximum_hour();
        if hour > maximum {
            return Err(TimeError::HourOutOfRange {
                hour,
                clock,
                maximum,
            });
        }
        if minute > 59 {
            return Err(TimeError::MinuteOutOfRange { minute });
        }

        let hour = u64::from(match clock {
            HourClock::Pm => hour + 12,
            HourClock::H24 | HourClock::Am => hour,
        });
        let timestamp = hour * MILLISECONDS_PER_HOUR + u64::from(minute) * MILLISECONDS_PER_MINUTE;
        Ok(Self {
            timestamp: timestamp as u32,
        })
    }

    pub(crate) fn saturating_from_millisecond_timestamp(timestamp: u32) -> Self {
        Self {
            timestamp: timestamp.min(Self::MAXIMUM_TIMESTAMP),
        }
    }

    pub fn millisecond_timestamp(self) -> u32 {
        self.timestamp
    }

    pub fn hour(self) -> u8 {
        (self.timestamp as u64 / MILLISECONDS_PER_HOUR) as u8
    }

    pub fn minute(self) -> u8 {
        ((self.timestamp as u64 % MILLISECONDS_PER_HOUR) / MILLISECONDS_PER_MINUTE) as u8
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.timestamp.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let timestamp = u32::deserialize(deserializer)?;
        Time::from_millisecond_timestamp(timestamp).map_err(serde::de::Error::custom)
    }
}
