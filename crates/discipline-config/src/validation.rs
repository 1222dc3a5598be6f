//! Configuration validation

use crate::schema::{RawActivator, RawConfig, RawDays, RawProtector, RawRule};
use crate::DEFAULT_MAX_RULES;
use discipline_util::{Duration, Time, Weekday, WeekdaySet};
use std::collections::HashSet;
use thiserror::Error;

/// Upper bound for the daily allowance
const MAX_DAILY_MINUTES: u64 = 24 * 60;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Rule '{rule_id}': {message}")]
    RuleError { rule_id: String, message: String },

    #[error("Duplicate rule ID: {0}")]
    DuplicateRuleId(String),

    #[error("Rule ID cannot be empty")]
    EmptyRuleId,

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid day specification: {0}")]
    InvalidDaySpec(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.daemon.tick_interval_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "tick_interval_seconds must be greater than zero".into(),
        ));
    }

    let max_rules = config.daemon.max_rules.unwrap_or(DEFAULT_MAX_RULES);
    if max_rules < config.rules.len() {
        errors.push(ValidationError::GlobalError(format!(
            "max_rules is {} but {} rules are configured",
            max_rules,
            config.rules.len()
        )));
    }

    if let Some(allowance) = &config.allowance {
        if allowance.daily_minutes == 0 || allowance.daily_minutes > MAX_DAILY_MINUTES {
            errors.push(ValidationError::GlobalError(format!(
                "allowance.daily_minutes must be between 1 and {}",
                MAX_DAILY_MINUTES
            )));
        }
    }

    // Check for duplicate rule IDs
    let mut seen_ids = HashSet::new();
    for id in config.rules.iter().filter_map(|rule| rule.id.as_ref()) {
        if !seen_ids.insert(id) {
            errors.push(ValidationError::DuplicateRuleId(id.clone()));
        }
    }

    for rule in &config.rules {
        errors.extend(validate_rule(rule));
    }

    errors
}

fn validate_rule(rule: &RawRule) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let rule_id = rule.id.clone().unwrap_or_else(|| "<unnamed>".into());

    if rule.id.as_ref().is_some_and(|id| id.trim().is_empty()) {
        errors.push(ValidationError::EmptyRuleId);
    }

    if let RawActivator::Time { days, from, till } = &rule.activator {
        match parse_days(days) {
            Ok(set) if set.is_empty() => errors.push(ValidationError::RuleError {
                rule_id: rule_id.clone(),
                message: "time activator needs at least one day".into(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidDaySpec(format!(
                "rule '{}': {}",
                rule_id, e
            ))),
        }

        for value in [from, till] {
            if let Err(e) = parse_time(value) {
                errors.push(ValidationError::InvalidTimeFormat {
                    value: value.clone(),
                    message: e,
                });
            }
        }
    }

    let (field, minutes) = match &rule.protector {
        RawProtector::Countdown { minutes, .. } => ("minutes", *minutes),
        RawProtector::CountdownAfterPlea { grace_minutes } => ("grace_minutes", *grace_minutes),
    };
    if minutes == 0 {
        errors.push(ValidationError::RuleError {
            rule_id: rule_id.clone(),
            message: format!("{} must be greater than zero", field),
        });
    } else if let Err(e) = Duration::from_minutes(minutes) {
        errors.push(ValidationError::RuleError {
            rule_id,
            message: format!("{}: {}", field, e),
        });
    }

    errors
}

/// Parse a time of day: 24-hour "HH:MM" or 12-hour "H:MM AM" / "H:MM PM".
/// In the 12-hour form "12" is the first hour of its half of the day.
pub fn parse_time(s: &str) -> Result<Time, String> {
    let s = s.trim();
    let lower = s.to_lowercase();
    let (clock, body) = if let Some(body) = lower.strip_suffix("am") {
        (Some(false), body.trim_end())
    } else if let Some(body) = lower.strip_suffix("pm") {
        (Some(true), body.trim_end())
    } else {
        (None, lower.as_str())
    };

    let parts: Vec<&str> = body.split(':').collect();
    if parts.len() != 2 {
        return Err("Expected HH:MM or H:MM AM/PM format".into());
    }

    let hour: u8 = parts[0]
        .parse()
        .map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1]
        .parse()
        .map_err(|_| "Invalid minute".to_string())?;

    let time = match clock {
        None => Time::from_hour_and_minute(hour, minute),
        Some(is_pm) => {
            if hour == 0 || hour > 12 {
                return Err("Hour must be 1-12 with AM/PM".into());
            }
            let hour = hour % 12;
            if is_pm {
                Time::from_hour_and_minute_pm(hour, minute)
            } else {
                Time::from_hour_and_minute_am(hour, minute)
            }
        }
    };
    time.map_err(|e| e.to_string())
}

/// Parse days specification
pub fn parse_days(days: &RawDays) -> Result<WeekdaySet, String> {
    match days {
        RawDays::Preset(preset) => match preset.to_lowercase().as_str() {
            "all" | "every" | "daily" => Ok(WeekdaySet::ALL),
            "weekdays" => Ok(WeekdaySet::WEEKDAYS),
            "weekends" => Ok(WeekdaySet::WEEKENDS),
            other => Err(format!("Unknown day preset: {}", other)),
        },
        RawDays::List(list) => list
            .iter()
            .map(|day| Weekday::from_name(day).ok_or_else(|| format!("Unknown day: {}", day)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawDaemonConfig;

    fn rule(id: &str, protector: RawProtector) -> RawRule {
        RawRule {
            id: Some(id.into()),
            label: None,
            activator: RawActivator::Always,
            protector,
        }
    }

    fn config(rules: Vec<RawRule>) -> RawConfig {
        RawConfig {
            config_version: 1,
            daemon: RawDaemonConfig::default(),
            allowance: None,
            rules,
        }
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("14:30").unwrap(), Time::from_hour_and_minute(14, 30).unwrap());
        assert_eq!(parse_time("00:00").unwrap(), Time::MIDNIGHT);
        assert_eq!(parse_time("23:59").unwrap().hour(), 23);

        assert!(parse_time("24:00").is_err());
        assert!(parse_time("12:60").is_err());
        assert!(parse_time("invalid").is_err());
    }

    #[test]
    fn test_parse_twelve_hour_time() {
        assert_eq!(parse_time("7:00 PM").unwrap(), Time::from_hour_and_minute(19, 0).unwrap());
        assert_eq!(parse_time("7:15am").unwrap(), Time::from_hour_and_minute(7, 15).unwrap());
        assert_eq!(parse_time("12:00 AM").unwrap(), Time::MIDNIGHT);
        assert_eq!(parse_time("12:30 PM").unwrap(), Time::from_hour_and_minute(12, 30).unwrap());

        assert!(parse_time("13:00 PM").is_err());
        assert!(parse_time("0:30 AM").is_err());
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days(&RawDays::Preset("weekdays".into())).unwrap(), WeekdaySet::WEEKDAYS);
        assert_eq!(parse_days(&RawDays::Preset("weekends".into())).unwrap(), WeekdaySet::WEEKENDS);
        assert_eq!(parse_days(&RawDays::Preset("all".into())).unwrap(), WeekdaySet::ALL);

        assert_eq!(
            parse_days(&RawDays::List(vec!["mon".into(), "wed".into(), "fri".into()]))
                .unwrap()
                .bitmask(),
            0b10101
        );
        assert!(parse_days(&RawDays::List(vec!["someday".into()])).is_err());
    }

    #[test]
    fn test_duplicate_id_detection() {
        let config = config(vec![
            rule("focus", RawProtector::Countdown { minutes: 10, start_immediately: false }),
            rule("focus", RawProtector::CountdownAfterPlea { grace_minutes: 5 }),
        ]);

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateRuleId(_))));
    }

    #[test]
    fn test_zero_durations_rejected() {
        let config = config(vec![rule(
            "zero",
            RawProtector::CountdownAfterPlea { grace_minutes: 0 },
        )]);

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::RuleError { .. })));
    }

    #[test]
    fn test_global_limits() {
        let mut config = config(vec![
            rule("a", RawProtector::CountdownAfterPlea { grace_minutes: 5 }),
            rule("b", RawProtector::CountdownAfterPlea { grace_minutes: 5 }),
        ]);
        config.daemon.max_rules = Some(1);
        config.daemon.tick_interval_seconds = Some(0);

        let errors = validate_config(&config);
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::GlobalError(_)))
                .count(),
            2
        );
    }

    #[test]
    fn test_empty_id_and_bad_window() {
        let config = config(vec![RawRule {
            id: Some(" ".into()),
            label: None,
            activator: RawActivator::Time {
                days: RawDays::List(vec![]),
                from: "25:00".into(),
                till: "06:00".into(),
            },
            protector: RawProtector::CountdownAfterPlea { grace_minutes: 5 },
        }]);

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::EmptyRuleId)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::RuleError { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidTimeFormat { .. })));
    }
}
