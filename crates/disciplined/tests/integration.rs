//! Integration tests for disciplined
//!
//! These tests drive configuration, engine and store together with a
//! hand-controlled clock.

use chrono::{Local, TimeZone};
use discipline_config::parse_config;
use discipline_core::{
    AllowanceTracker, BlockReason, CoreEvent, DeactivateOutcome, DisciplineEngine, ProtectorStates,
};
use discipline_store::{Codec, FileStore, SqliteStore, StoreError, ValueStore};
use discipline_util::{DateTime, Duration, RuleId, Time, Weekday};

const CONFIG: &str = r#"
    config_version = 1

    [daemon]
    tick_interval_seconds = 30

    [allowance]
    daily_minutes = 120

    [[rules]]
    id = "bedtime"
    label = "Bedtime"
    activator = { type = "time", days = "all", from = "7:00 PM", till = "04:00" }
    protector = { type = "countdown_after_plea", grace_minutes = 30 }

    [[rules]]
    id = "focus"
    activator = { type = "always" }
    protector = { type = "countdown", minutes = 90, start_immediately = false }
"#;

/// Local wall-clock time on a January 2025 day (the 6th is a Monday)
fn local(day: u32, hour: u32, minute: u32) -> DateTime {
    DateTime::from_chrono(&Local.with_ymd_and_hms(2025, 1, day, hour, minute, 0).unwrap())
}

fn minutes(m: u64) -> Duration {
    Duration::from_minutes(m).unwrap()
}

fn allowance_codec(daily: Duration, now: DateTime) -> Codec<AllowanceTracker> {
    Codec::new(
        AllowanceTracker::to_json_string,
        AllowanceTracker::from_json_str,
        move || AllowanceTracker::new(daily, now),
    )
}

/// Run ticks every `step` minutes from `from` up to and including `till`
fn tick_through(engine: &mut DisciplineEngine, from: DateTime, till: DateTime, step: u64) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    let mut now = from;
    while now <= till {
        events.extend(engine.synchronize(now));
        now = now.checked_add(minutes(step)).unwrap();
    }
    events
}

#[test]
fn test_evening_with_plea() {
    let policy = parse_config(CONFIG).unwrap();
    let start = local(6, 18, 0);
    let mut engine = DisciplineEngine::from_policy(&policy, None, start).unwrap();

    assert!(!engine.access_decision_at(start).blocked);

    // Bedtime window opens at 19:00
    let evening = local(6, 19, 0);
    engine.synchronize(evening);
    let decision = engine.access_decision_at(evening);
    assert!(decision.blocked);
    assert_eq!(
        decision.reasons,
        vec![BlockReason::RuleEffective {
            rule_id: RuleId::new("bedtime")
        }]
    );

    // Plead, then keep ticking through the grace period
    let bedtime = RuleId::new("bedtime");
    assert_eq!(engine.plead(&bedtime, evening).unwrap(), DeactivateOutcome::Success);

    let events = tick_through(&mut engine, local(6, 19, 1), local(6, 19, 29), 1);
    assert!(events.is_empty());
    assert!(engine.access_decision_at(local(6, 19, 29)).blocked);

    let events = engine.synchronize(local(6, 19, 30));
    assert!(events.contains(&CoreEvent::ProtectionLifted {
        rule_id: bedtime.clone()
    }));
    assert!(!engine.access_decision_at(local(6, 19, 30)).blocked);
}

#[test]
fn test_allowance_runs_out_and_refills() {
    let policy = parse_config(CONFIG).unwrap();
    let start = local(7, 8, 0);
    let mut engine = DisciplineEngine::from_policy(&policy, None, start).unwrap();

    // Irregular ticks still add up to real elapsed time
    let mut events = Vec::new();
    for (hour, minute) in [(8, 1), (8, 45), (9, 2), (9, 59)] {
        events.extend(engine.synchronize(local(7, hour, minute)));
    }
    assert!(events.is_empty());
    assert_eq!(engine.allowance().unwrap().remaining_duration(), minutes(1));

    let events = engine.synchronize(local(7, 10, 0));
    assert_eq!(events, vec![CoreEvent::AllowanceExhausted { allowance: minutes(120) }]);

    let noon = local(7, 12, 0);
    let decision = engine.access_decision(Weekday::Tue, Time::from_hour_and_minute(12, 0).unwrap());
    assert_eq!(
        decision.reasons,
        vec![BlockReason::AllowanceUp { allowance: minutes(120) }]
    );
    assert!(engine.access_decision_at(noon).blocked);

    let next_morning = local(8, 7, 0);
    let events = engine.synchronize(next_morning);
    assert_eq!(events, vec![CoreEvent::AllowanceReset { allowance: minutes(120) }]);
    assert!(!engine.access_decision_at(next_morning).blocked);
}

#[test]
fn test_focus_countdown() {
    let policy = parse_config(CONFIG).unwrap();
    let start = local(8, 9, 0);
    let mut engine = DisciplineEngine::from_policy(&policy, None, start).unwrap();
    let focus = RuleId::new("focus");

    engine.start_countdown(&focus, start).unwrap();
    assert!(engine.access_decision_at(start).blocked);

    let events = tick_through(&mut engine, local(8, 9, 30), local(8, 10, 30), 30);
    assert_eq!(events, vec![CoreEvent::ProtectionLifted { rule_id: focus }]);
    assert!(!engine.access_decision_at(local(8, 10, 30)).blocked);
}

#[tokio::test]
async fn test_allowance_survives_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("allowance.json");
    let policy = parse_config(CONFIG).unwrap();
    let daily = policy.allowance.unwrap().daily;

    // First run: nothing stored yet
    let start = local(9, 8, 0);
    let store = FileStore::new(&path, allowance_codec(daily, start));
    let persisted = store.read().await.unwrap();
    assert_eq!(persisted.remaining_duration(), daily);

    let mut engine = DisciplineEngine::from_policy(&policy, Some(persisted), start).unwrap();
    engine.synchronize(local(9, 8, 45));
    store.write(engine.allowance().unwrap()).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with(&format!("[{},{},", daily.milliseconds(), minutes(75).milliseconds())));

    // Second run later the same day: downtime is not charged
    let restart = local(9, 13, 0);
    let store = FileStore::new(&path, allowance_codec(daily, restart));
    let persisted = store.read().await.unwrap();
    let engine = DisciplineEngine::from_policy(&policy, Some(persisted), restart).unwrap();
    assert_eq!(engine.allowance().unwrap().remaining_duration(), minutes(75));
}

#[tokio::test]
async fn test_corrupt_allowance_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("allowance.json");
    std::fs::write(&path, r#"[7200000,"lots",0]"#).unwrap();

    let now = local(9, 8, 0);
    let store = FileStore::new(&path, allowance_codec(minutes(120), now));
    let err = store.read().await.unwrap_err();
    assert!(matches!(err, StoreError::Deserialize { .. }));

    let mut chain = Vec::new();
    let mut source: Option<&dyn std::error::Error> = Some(&err);
    while let Some(e) = source {
        chain.push(e.to_string());
        source = e.source();
    }
    assert!(chain.iter().any(|m| m.contains("remaining_duration")));
}

#[tokio::test]
async fn test_sqlite_store_round_trip() {
    let now = local(9, 8, 0);
    let store = SqliteStore::in_memory("allowance", allowance_codec(minutes(120), now)).unwrap();

    let fresh = store.read().await.unwrap();
    assert_eq!(fresh, AllowanceTracker::new(minutes(120), now));

    let mut tracker = fresh;
    tracker.synchronize(local(9, 9, 0));
    store.write(&tracker).await.unwrap();
    assert_eq!(store.read().await.unwrap(), tracker);
}

#[tokio::test]
async fn test_plea_survives_restart_with_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disciplined.db");
    let policy = parse_config(CONFIG).unwrap();
    let bedtime = RuleId::new("bedtime");
    let protector_codec = || {
        Codec::new(
            ProtectorStates::to_json_string,
            ProtectorStates::from_json_str,
            ProtectorStates::new,
        )
    };

    let start = local(6, 19, 0);
    let mut engine = DisciplineEngine::from_policy(&policy, None, start).unwrap();
    engine.plead(&bedtime, local(6, 19, 5)).unwrap();
    engine.synchronize(local(6, 19, 20));
    {
        let protectors = SqliteStore::open(&path, "protectors", protector_codec()).unwrap();
        let allowance =
            SqliteStore::open(&path, "allowance", allowance_codec(minutes(120), start)).unwrap();
        protectors.write(&engine.protector_states()).await.unwrap();
        allowance.write(engine.allowance().unwrap()).await.unwrap();
    }

    // Ten minutes of downtime still count toward the grace period
    let restart = local(6, 19, 30);
    let protectors = SqliteStore::open(&path, "protectors", protector_codec()).unwrap();
    let allowance =
        SqliteStore::open(&path, "allowance", allowance_codec(minutes(120), restart)).unwrap();
    let persisted = allowance.read().await.unwrap();
    assert_eq!(persisted.remaining_duration(), minutes(100));

    let mut engine = DisciplineEngine::from_policy(&policy, Some(persisted), restart).unwrap();
    assert_eq!(engine.restore_protector_states(&protectors.read().await.unwrap()), 2);
    assert!(engine.access_decision_at(restart).blocked);

    let events = engine.synchronize(local(6, 19, 35));
    assert!(events.contains(&CoreEvent::ProtectionLifted {
        rule_id: bedtime.clone()
    }));
    assert!(!engine.rule(&bedtime).unwrap().is_protected());
}
