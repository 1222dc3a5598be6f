//! Shared utilities for discipline
//!
//! This crate provides:
//! - Temporal primitives (Duration, Time, DateTime, TimeRange, Weekday, WeekdaySet)
//! - Clock access with debug mock time
//! - ID types (RuleId)
//! - Error types
//! - Default paths for config and data directories

mod clock;
mod datetime;
mod duration;
mod error;
mod ids;
mod paths;
mod time_of_day;
mod time_range;
mod weekday;

pub use clock::*;
pub use datetime::*;
pub use duration::*;
pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time_of_day::*;
pub use time_range::*;
pub use weekday::*;
