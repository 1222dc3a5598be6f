//! Daily usage allowance and its persisted record
//!
//! The record is a JSON array `[allowance_ms, remaining_ms, previous_sync_epoch_ms]`.

use discipline_util::{DateTime, DateTimeError, Duration, DurationError};
use serde_json::Value;
use thiserror::Error;

use crate::Countdown;

const FIELD_ALLOWANCE: &str = "allowance";
const FIELD_REMAINING: &str = "remaining_duration";
const FIELD_PREVIOUS_SYNC: &str = "previous_synchronization_time";
const FIELDS: [&str; 3] = [FIELD_ALLOWANCE, FIELD_REMAINING, FIELD_PREVIOUS_SYNC];

/// Why a persisted allowance record was rejected
#[derive(Debug, Error)]
pub enum AllowanceDecodeError {
    #[error("Allowance record is not valid JSON")]
    Json(#[from] serde_json::Error),

    #[error("Allowance record is not a JSON array")]
    NotAnArray,

    #[error("Allowance record has {found} fields, expected at most {expected}")]
    WrongLength { found: usize, expected: usize },

    #[error("Invalid allowance record field '{field}'")]
    Field {
        field: &'static str,
        #[source]
        source: FieldError,
    },
}

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Field is missing")]
    Missing,

    #[error("Expected an integer, found {found}")]
    NotAnInteger { found: Value },

    #[error("Invalid duration")]
    Duration(#[from] DurationError),

    #[error("Invalid timestamp")]
    DateTime(#[from] DateTimeError),

    #[error("Remaining {remaining} exceeds the allowance of {allowance}")]
    ExceedsAllowance { remaining: Duration, allowance: Duration },
}

/// Counts a daily allowance down while the device is in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceTracker {
    allowance: Duration,
    countdown: Countdown,
}

impl AllowanceTracker {
    pub fn new(allowance: Duration, now: DateTime) -> Self {
        Self {
            allowance,
            countdown: Countdown::new(allowance, now),
        }
    }

    pub fn construct(allowance: Duration, countdown: Countdown) -> Self {
        Self {
            allowance,
            countdown,
        }
    }

    pub fn allowance(&self) -> Duration {
        self.allowance
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn remaining_duration(&self) -> Duration {
        self.countdown.remaining_duration()
    }

    pub fn previous_synchronization_time(&self) -> DateTime {
        self.countdown.previous_synchronization_time()
    }

    pub fn is_allowance_up(&self) -> bool {
        self.countdown.is_finished()
    }

    pub fn synchronize(&mut self, now: DateTime) {
        self.countdown.synchronize(now);
    }

    /// Restore the full allowance starting at `now`
    pub fn reset(&mut self, now: DateTime) {
        self.countdown = Countdown::new(self.allowance, now);
    }

    /// Continue counting from `now` without charging the time since the last
    /// synchronization (used after the daemon was not running).
    pub fn resume(&mut self, now: DateTime) {
        self.countdown = Countdown::construct(self.countdown.remaining_duration(), now);
    }

    pub fn to_json(&self) -> Value {
        Value::Array(vec![
            Value::from(self.allowance.milliseconds()),
            Value::from(self.countdown.remaining_duration().milliseconds()),
            Value::from(self.countdown.previous_synchronization_time().millisecond_timestamp()),
        ])
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    pub fn from_json(value: &Value) -> Result<Self, AllowanceDecodeError> {
        let fields = value.as_array().ok_or(AllowanceDecodeError::NotAnArray)?;
        if fields.len() > FIELDS.len() {
            return Err(AllowanceDecodeError::WrongLength {
                found: fields.len(),
                expected: FIELDS.len(),
            });
        }
        if let Some(&field) = FIELDS.get(fields.len()) {
            return Err(AllowanceDecodeError::Field {
                field,
                source: FieldError::Missing,
            });
        }

        let allowance = decode_duration(&fields[0]).map_err(field_error(FIELD_ALLOWANCE))?;
        let remaining = decode_duration(&fields[1]).map_err(field_error(FIELD_REMAINING))?;
        let previous = decode_datetime(&fields[2]).map_err(field_error(FIELD_PREVIOUS_SYNC))?;

        if remaining > allowance {
            return Err(AllowanceDecodeError::Field {
                field: FIELD_REMAINING,
                source: FieldError::ExceedsAllowance {
                    remaining,
                    allowance,
                },
            });
        }

        Ok(Self::construct(allowance, Countdown::construct(remaining, previous)))
    }

    pub fn from_json_str(text: &str) -> Result<Self, AllowanceDecodeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }
}

fn field_error(field: &'static str) -> impl FnOnce(FieldError) -> AllowanceDecodeError {
    move |source| AllowanceDecodeError::Field { field, source }
}

fn decode_duration(value: &Value) -> Result<Duration, FieldError> {
    if let Some(milliseconds) = value.as_u64() {
        return Ok(Duration::from_milliseconds(milliseconds)?);
    }
    if let Some(milliseconds) = value.as_i64() {
        return Ok(Duration::from_signed_milliseconds(milliseconds)?);
    }
    Err(FieldError::NotAnInteger {
        found: value.clone(),
    })
}

fn decode_datetime(value: &Value) -> Result<DateTime, FieldError> {
    match value.as_i64() {
        Some(timestamp) => Ok(DateTime::from_millisecond_timestamp(timestamp)?),
        None => Err(FieldError::NotAnInteger {
            found: value.clone(),
        }),
    }
}
