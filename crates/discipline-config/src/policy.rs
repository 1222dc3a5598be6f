//! Validated policy structures

use crate::schema::{RawActivator, RawAllowance, RawConfig, RawDaemonConfig, RawProtector, RawRule};
use crate::validation::{parse_days, parse_time};
use discipline_util::{default_data_dir, Duration, RuleId, Time, TimeRange, WeekdaySet};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default seconds between synchronization ticks
pub const DEFAULT_TICK_INTERVAL_SECONDS: u64 = 30;

/// Default rule group capacity
pub const DEFAULT_MAX_RULES: usize = 64;

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone)]
pub struct Policy {
    /// Daemon configuration
    pub daemon: DaemonConfig,

    pub allowance: Option<AllowancePolicy>,

    /// Validated rules, in config order
    pub rules: Vec<RulePolicy>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            daemon: DaemonConfig::from_raw(raw.daemon),
            allowance: raw.allowance.map(AllowancePolicy::from_raw),
            rules: raw.rules.into_iter().map(RulePolicy::from_raw).collect(),
        }
    }

    /// Get rule by ID
    pub fn get_rule(&self, id: &RuleId) -> Option<&RulePolicy> {
        self.rules.iter().find(|r| &r.id == id)
    }
}

/// Backend for the persisted allowance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON text file in the data directory
    #[default]
    File,
    /// SQLite database in the data directory
    Sqlite,
}

/// How effective rules combine into a block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockPolicy {
    /// Blocked while any rule is effective
    #[default]
    Any,
    /// Blocked only while every rule is effective
    All,
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub tick_interval: Duration,
    pub data_dir: PathBuf,
    pub storage: StorageBackend,
    pub block_policy: BlockPolicy,
    pub max_rules: usize,
}

impl DaemonConfig {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        let tick_interval = raw
            .tick_interval_seconds
            .and_then(|seconds| Duration::from_seconds(seconds).ok())
            .unwrap_or_else(default_tick_interval);

        Self {
            tick_interval,
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            storage: raw.storage.unwrap_or_default(),
            block_policy: raw.block_policy.unwrap_or_default(),
            max_rules: raw.max_rules.unwrap_or(DEFAULT_MAX_RULES),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_raw(RawDaemonConfig::default())
    }
}

fn default_tick_interval() -> Duration {
    Duration::saturating_from_milliseconds(DEFAULT_TICK_INTERVAL_SECONDS * 1000)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowancePolicy {
    pub daily: Duration,
    pub reset_daily: bool,
}

impl AllowancePolicy {
    fn from_raw(raw: RawAllowance) -> Self {
        Self {
            daily: minutes(raw.daily_minutes),
            reset_daily: raw.reset_daily,
        }
    }
}

/// Validated rule definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulePolicy {
    pub id: RuleId,
    pub label: String,
    pub activator: ActivatorPolicy,
    pub protector: ProtectorPolicy,
}

impl RulePolicy {
    fn from_raw(raw: RawRule) -> Self {
        let id = raw.id.map(RuleId::new).unwrap_or_else(RuleId::generate);
        let label = raw.label.unwrap_or_else(|| id.to_string());
        Self {
            id,
            label,
            activator: ActivatorPolicy::from_raw(raw.activator),
            protector: ProtectorPolicy::from_raw(raw.protector),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivatorPolicy {
    Always,
    Time {
        weekdays: WeekdaySet,
        range: TimeRange,
    },
}

impl ActivatorPolicy {
    fn from_raw(raw: RawActivator) -> Self {
        match raw {
            RawActivator::Always => ActivatorPolicy::Always,
            RawActivator::Time { days, from, till } => {
                let from = parse_time(&from).unwrap_or(Time::MIDNIGHT);
                let till = parse_time(&till).unwrap_or(Time::MIDNIGHT);
                ActivatorPolicy::Time {
                    weekdays: parse_days(&days).unwrap_or(WeekdaySet::EMPTY),
                    range: TimeRange::from_times(from, till),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectorPolicy {
    /// Protects while a started countdown runs
    Countdown {
        duration: Duration,
        start_immediately: bool,
    },
    /// Protects until a plea's grace period runs out
    CountdownAfterPlea { grace: Duration },
}

impl ProtectorPolicy {
    fn from_raw(raw: RawProtector) -> Self {
        match raw {
            RawProtector::Countdown {
                minutes: m,
                start_immediately,
            } => ProtectorPolicy::Countdown {
                duration: minutes(m),
                start_immediately,
            },
            RawProtector::CountdownAfterPlea { grace_minutes } => {
                ProtectorPolicy::CountdownAfterPlea {
                    grace: minutes(grace_minutes),
                }
            }
        }
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_minutes(m).unwrap_or(Duration::MAX)
}
