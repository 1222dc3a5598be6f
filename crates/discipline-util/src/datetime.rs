//! Absolute points in time

use chrono::{Datelike, Local, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::{Duration, Time, Weekday};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateTimeError {
    #[error("Timestamp {timestamp} is outside the representable range of millisecond UTC timestamps")]
    OutOfRange { timestamp: i64 },
}

/// A UTC instant with millisecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime {
    inner: chrono::DateTime<Utc>,
}

impl DateTime {
    pub fn from_millisecond_timestamp(timestamp: i64) -> Result<Self, DateTimeError> {
        chrono::DateTime::from_timestamp_millis(timestamp)
            .map(|inner| Self { inner })
            .ok_or(DateTimeError::OutOfRange { timestamp })
    }

    /// Truncates to millisecond precision
    pub fn from_chrono<Tz: TimeZone>(dt: &chrono::DateTime<Tz>) -> Self {
        let utc = dt.with_timezone(&Utc);
        let inner = chrono::DateTime::from_timestamp_millis(utc.timestamp_millis()).unwrap_or(utc);
        Self { inner }
    }

    pub fn millisecond_timestamp(self) -> i64 {
        self.inner.timestamp_millis()
    }

    /// Time of day in UTC
    pub fn time_of_day(self) -> Time {
        time_from_parts(self.inner.num_seconds_from_midnight(), self.inner.nanosecond())
    }

    /// Weekday in UTC
    pub fn weekday(self) -> Weekday {
        self.inner.weekday().into()
    }

    /// Weekday and time of day in the local timezone, as seen by the person
    /// the rules are written for
    pub fn local_weekday_and_time(self) -> (Weekday, Time) {
        let local = self.inner.with_timezone(&Local);
        (
            local.weekday().into(),
            time_from_parts(local.num_seconds_from_midnight(), local.nanosecond()),
        )
    }

    /// Calendar date in the local timezone
    pub fn local_date(self) -> NaiveDate {
        self.inner.with_timezone(&Local).date_naive()
    }

    /// `later - self`, or zero if `later` is not after `self`
    pub fn till_or_zero(self, later: DateTime) -> Duration {
        difference_or_zero(later.millisecond_timestamp(), self.millisecond_timestamp())
    }

    /// `self - earlier`, or zero if `earlier` is not before `self`
    pub fn since_or_zero(self, earlier: DateTime) -> Duration {
        difference_or_zero(self.millisecond_timestamp(), earlier.millisecond_timestamp())
    }

    pub fn checked_add(self, duration: Duration) -> Option<DateTime> {
        let millis = i64::try_from(duration.milliseconds()).ok()?;
        self.millisecond_timestamp()
            .checked_add(millis)
            .and_then(|timestamp| Self::from_millisecond_timestamp(timestamp).ok())
    }

    pub fn checked_sub(self, duration: Duration) -> Option<DateTime> {
        let millis = i64::try_from(duration.milliseconds()).ok()?;
        self.millisecond_timestamp()
            .checked_sub(millis)
            .and_then(|timestamp| Self::from_millisecond_timestamp(timestamp).ok())
    }

    pub fn to_chrono(self) -> chrono::DateTime<Utc> {
        self.inner
    }
}

fn time_from_parts(seconds_from_midnight: u32, nanosecond: u32) -> Time {
    // Leap seconds report nanosecond >= 1_000_000_000
    let millis = (nanosecond / 1_000_000).min(999);
    Time::saturating_from_millisecond_timestamp(seconds_from_midnight * 1000 + millis)
}

fn difference_or_zero(lhs: i64, rhs: i64) -> Duration {
    match lhs.checked_sub(rhs) {
        Some(difference) if difference > 0 => Duration::saturating_from_milliseconds(difference as u64),
        _ => Duration::ZERO,
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    }
}

impl Serialize for DateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.millisecond_timestamp().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let timestamp = i64::deserialize(deserializer)?;
        DateTime::from_millisecond_timestamp(timestamp).map_err(serde::de::Error::custom)
    }
}
