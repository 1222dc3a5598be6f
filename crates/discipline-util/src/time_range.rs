//! Daily time windows, including ones that cross midnight

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{MILLISECONDS_PER_DAY, Time};

const DAY: u32 = MILLISECONDS_PER_DAY as u32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeRangeError {
    #[error("Range start {from} is greater than the maximum of {maximum}")]
    FromOutOfRange { from: u32, maximum: u32 },

    #[error("Range end {till} is greater than the maximum of {maximum}")]
    TillOutOfRange { till: u32, maximum: u32 },

    #[error("Range start {from} is later than range end {till}")]
    FromLaterThanTill { from: u32, till: u32 },

    #[error("Range {from}..={till} is longer than one day")]
    LongerThanOneDay { from: u32, till: u32 },
}

/// A window `[from, till]` of milliseconds since midnight.
///
/// `till` may run into the following day (up to two days from midnight), so
/// 19:00-04:00 is stored as `[19h, 28h]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TimeRangeFields")]
pub struct TimeRange {
    from: u32,
    till: u32,
}

#[derive(Deserialize)]
struct TimeRangeFields {
    from: u32,
    till: u32,
}

impl TryFrom<TimeRangeFields> for TimeRange {
    type Error = TimeRangeError;

    fn try_from(fields: TimeRangeFields) -> Result<Self, Self::Error> {
        TimeRange::from_timestamps(fields.from, fields.till)
    }
}

impl TimeRange {
    pub const MAXIMUM_FROM: u32 = DAY - 1;
    pub const MAXIMUM_TILL: u32 = DAY * 2 - 1;

    /// Build from two times of day. When `till` is earlier than `from` the
    /// window is taken to end on the following day.
    pub fn from_times(from: Time, till: Time) -> Self {
        let from = from.millisecond_timestamp();
        let till = till.millisecond_timestamp();
        if from <= till {
            Self { from, till }
        } else {
            Self {
                from,
                till: till + DAY,
            }
        }
    }

    pub fn from_timestamps(from: u32, till: u32) -> Result<Self, TimeRangeError> {
        if from > Self::MAXIMUM_FROM {
            return Err(TimeRangeError::FromOutOfRange {
                from,
                maximum: Self::MAXIMUM_FROM,
            });
        }
        if till > Self::MAXIMUM_TILL {
            return Err(TimeRangeError::TillOutOfRange {
                till,
                maximum: Self::MAXIMUM_TILL,
            });
        }
        if from > till {
            return Err(TimeRangeError::FromLaterThanTill { from, till });
        }
        if till - from > DAY {
            return Err(TimeRangeError::LongerThanOneDay { from, till });
        }
        Ok(Self { from, till })
    }

    pub fn from_timestamp(&self) -> u32 {
        self.from
    }

    pub fn till_timestamp(&self) -> u32 {
        self.till
    }

    pub fn crosses_midnight(&self) -> bool {
        self.till >= DAY
    }

    /// Inclusive on both ends. Times after midnight also match the part of
    /// the window that runs into the next day.
    pub fn contains(&self, time: Time) -> bool {
        let time = time.millisecond_timestamp();
        let next_day = time + DAY;
        (self.from <= time && time <= self.till) || (self.from <= next_day && next_day <= self.till)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = Time::saturating_from_millisecond_timestamp(self.from);
        let till = Time::saturating_from_millisecond_timestamp(self.till % DAY);
        if self.crosses_midnight() {
            write!(f, "{from}-{till} (next day)")
        } else {
            write!(f, "{from}-{till}")
        }
    }
}
