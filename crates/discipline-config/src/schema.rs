//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{BlockPolicy, StorageBackend};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global daemon settings
    #[serde(default)]
    pub daemon: RawDaemonConfig,

    /// Daily usage allowance; absent means no allowance is tracked
    #[serde(default)]
    pub allowance: Option<RawAllowance>,

    #[serde(default)]
    pub rules: Vec<RawRule>,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// Seconds between synchronization ticks (default: 30)
    pub tick_interval_seconds: Option<u64>,

    /// Data directory for persisted state
    pub data_dir: Option<PathBuf>,

    /// Where the allowance is persisted (default: file)
    pub storage: Option<StorageBackend>,

    /// How effective rules combine into a block (default: any)
    pub block_policy: Option<BlockPolicy>,

    /// Maximum number of rules (default: 64)
    pub max_rules: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAllowance {
    pub daily_minutes: u64,

    /// Refill the allowance when the local date changes
    #[serde(default = "default_reset_daily")]
    pub reset_daily: bool,
}

fn default_reset_daily() -> bool {
    true
}

/// Raw rule definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRule {
    /// Unique stable ID; generated when omitted
    pub id: Option<String>,

    /// Display label
    pub label: Option<String>,

    pub activator: RawActivator,

    pub protector: RawProtector,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawActivator {
    Always,
    Time {
        days: RawDays,
        /// Window start ("HH:MM" or "H:MM AM")
        from: String,
        /// Window end; earlier than `from` means the next day
        till: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawProtector {
    Countdown {
        minutes: u64,
        #[serde(default)]
        start_immediately: bool,
    },
    CountdownAfterPlea {
        grace_minutes: u64,
    },
}

/// Days specification
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDays {
    Preset(String),
    List(Vec<String>),
}
