//! Persisted protector state
//!
//! Pleas in progress and running countdowns are saved per rule so a restart
//! does not re-arm a lifted rule or restart a countdown from its full length.
//! The record is a JSON object keyed by rule ID:
//!
//! ```json
//! {"bedtime": {"state": "deactivating", "remaining_ms": 600000, "previous_sync_ms": 1736190000000},
//!  "focus": {"state": "idle"}}
//! ```

use discipline_util::{DateTime, DateTimeError, Duration, DurationError, RuleId};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{
    Countdown, CountdownAfterPleaConditional, CountdownConditional, CountdownState, PleaStatus,
    RuleProtector,
};

/// Why a saved protector state could not be applied to a rule
#[derive(Debug, Error)]
pub enum ProtectorStateError {
    #[error("Saved state '{state}' does not fit a {protector} protector")]
    KindMismatch {
        state: &'static str,
        protector: &'static str,
    },

    #[error("Invalid remaining duration")]
    Duration(#[from] DurationError),

    #[error("Invalid synchronization timestamp")]
    DateTime(#[from] DateTimeError),

    #[error("Remaining {remaining} exceeds the protector duration of {duration}")]
    ExceedsDuration { remaining: Duration, duration: Duration },
}

/// Saved state of one protector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProtectorState {
    /// Countdown protector, not running
    Idle,
    Running { remaining_ms: u64, previous_sync_ms: i64 },
    /// Plea protector, no plea made
    Activated,
    Deactivating { remaining_ms: u64, previous_sync_ms: i64 },
    Deactivated,
}

impl ProtectorState {
    pub fn capture(protector: &RuleProtector) -> Self {
        match protector {
            RuleProtector::Countdown(conditional) => match conditional.state() {
                CountdownState::Idle => ProtectorState::Idle,
                CountdownState::Running { countdown } => ProtectorState::Running {
                    remaining_ms: countdown.remaining_duration().milliseconds(),
                    previous_sync_ms: countdown.previous_synchronization_time().millisecond_timestamp(),
                },
            },
            RuleProtector::CountdownAfterPlea(conditional) => match conditional.status() {
                PleaStatus::Activated => ProtectorState::Activated,
                PleaStatus::Deactivating { countdown } => ProtectorState::Deactivating {
                    remaining_ms: countdown.remaining_duration().milliseconds(),
                    previous_sync_ms: countdown.previous_synchronization_time().millisecond_timestamp(),
                },
                PleaStatus::Deactivated => ProtectorState::Deactivated,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProtectorState::Idle => "idle",
            ProtectorState::Running { .. } => "running",
            ProtectorState::Activated => "activated",
            ProtectorState::Deactivating { .. } => "deactivating",
            ProtectorState::Deactivated => "deactivated",
        }
    }

    /// Rebuild `protector` in this state, keeping its configured duration.
    ///
    /// The protector is left untouched on error.
    pub fn apply(&self, protector: &mut RuleProtector) -> Result<(), ProtectorStateError> {
        let mismatch = ProtectorStateError::KindMismatch {
            state: self.name(),
            protector: protector.kind(),
        };

        match (protector, *self) {
            (RuleProtector::Countdown(conditional), ProtectorState::Idle) => {
                *conditional = CountdownConditional::from_fields(conditional.duration(), None);
            }
            (
                RuleProtector::Countdown(conditional),
                ProtectorState::Running {
                    remaining_ms,
                    previous_sync_ms,
                },
            ) => {
                let countdown =
                    restore_countdown(conditional.duration(), remaining_ms, previous_sync_ms)?;
                *conditional =
                    CountdownConditional::from_fields(conditional.duration(), Some(countdown));
            }
            (RuleProtector::CountdownAfterPlea(conditional), ProtectorState::Activated) => {
                *conditional = CountdownAfterPleaConditional::from_status(
                    conditional.duration(),
                    PleaStatus::Activated,
                );
            }
            (
                RuleProtector::CountdownAfterPlea(conditional),
                ProtectorState::Deactivating {
                    remaining_ms,
                    previous_sync_ms,
                },
            ) => {
                let countdown =
                    restore_countdown(conditional.duration(), remaining_ms, previous_sync_ms)?;
                *conditional = CountdownAfterPleaConditional::from_status(
                    conditional.duration(),
                    PleaStatus::Deactivating { countdown },
                );
            }
            (RuleProtector::CountdownAfterPlea(conditional), ProtectorState::Deactivated) => {
                *conditional = CountdownAfterPleaConditional::from_status(
                    conditional.duration(),
                    PleaStatus::Deactivated,
                );
            }
            _ => return Err(mismatch),
        }
        Ok(())
    }

    fn to_json(self) -> Value {
        match self {
            ProtectorState::Running {
                remaining_ms,
                previous_sync_ms,
            }
            | ProtectorState::Deactivating {
                remaining_ms,
                previous_sync_ms,
            } => json!({
                "state": self.name(),
                "remaining_ms": remaining_ms,
                "previous_sync_ms": previous_sync_ms,
            }),
            _ => json!({ "state": self.name() }),
        }
    }
}

fn restore_countdown(
    duration: Duration,
    remaining_ms: u64,
    previous_sync_ms: i64,
) -> Result<Countdown, ProtectorStateError> {
    let remaining = Duration::from_milliseconds(remaining_ms)?;
    if remaining > duration {
        return Err(ProtectorStateError::ExceedsDuration {
            remaining,
            duration,
        });
    }
    let previous = DateTime::from_millisecond_timestamp(previous_sync_ms)?;
    Ok(Countdown::construct(remaining, previous))
}

/// Saved protector state of every rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ProtectorStates {
    rules: BTreeMap<String, ProtectorState>,
}

impl ProtectorStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, rule_id: &RuleId) -> Option<&ProtectorState> {
        self.rules.get(rule_id.as_str())
    }

    pub fn insert(&mut self, rule_id: &RuleId, state: ProtectorState) {
        self.rules.insert(rule_id.as_str().to_string(), state);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn to_json_string(&self) -> String {
        let map: Map<String, Value> = self
            .rules
            .iter()
            .map(|(rule_id, state)| (rule_id.clone(), state.to_json()))
            .collect();
        Value::Object(map).to_string()
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
