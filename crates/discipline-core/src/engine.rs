//! Synchronization driver
//!
//! [`DisciplineEngine`] owns the rule group and the allowance tracker. The
//! daemon calls [`DisciplineEngine::synchronize`] on every tick and asks for an
//! [`AccessDecision`] whenever it needs one; nothing in here reads the clock.

use discipline_config::{ActivatorPolicy, BlockPolicy, Policy, ProtectorPolicy, RulePolicy};
use discipline_util::{DateTime, DisciplineError, Duration, Result, RuleId, Time, Weekday};
use tracing::{debug, info, warn};

use crate::{
    ActivateOutcome, AllowanceTracker, AlwaysConditional, CoreEvent, CountdownAfterPleaConditional,
    CountdownConditional, DeactivateOutcome, ProtectorState, ProtectorStates, Rule, RuleActivator,
    RuleGroup, RuleProtector, TimeConditional,
};

/// Why access is blocked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    RuleEffective { rule_id: RuleId },
    AllowanceUp { allowance: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub blocked: bool,
    pub reasons: Vec<BlockReason>,
}

impl AccessDecision {
    pub fn allowed() -> Self {
        Self {
            blocked: false,
            reasons: Vec::new(),
        }
    }
}

pub struct DisciplineEngine {
    rules: RuleGroup,
    allowance: Option<AllowanceTracker>,
    reset_allowance_daily: bool,
    block_policy: BlockPolicy,
}

impl DisciplineEngine {
    /// Build the engine from a validated policy and the allowance tracker
    /// persisted by a previous run, if any.
    pub fn from_policy(
        policy: &Policy,
        persisted: Option<AllowanceTracker>,
        now: DateTime,
    ) -> Result<Self> {
        let mut rules = RuleGroup::with_capacity(policy.daemon.max_rules);
        for rule_policy in &policy.rules {
            rules.insert(rule_policy.id.clone(), build_rule(rule_policy, now))?;
        }

        let reset_allowance_daily = policy.allowance.is_some_and(|p| p.reset_daily);
        let allowance = policy.allowance.map(|allowance_policy| {
            match persisted {
                Some(tracker) if tracker.remaining_duration() > tracker.allowance() => {
                    warn!(
                        remaining = %tracker.remaining_duration(),
                        allowance = %tracker.allowance(),
                        "Persisted allowance has more time left than it allows, starting fresh"
                    );
                    AllowanceTracker::new(allowance_policy.daily, now)
                }
                Some(mut tracker) if tracker.allowance() == allowance_policy.daily => {
                    if reset_allowance_daily
                        && tracker.previous_synchronization_time().local_date() != now.local_date()
                    {
                        info!("Persisted allowance is from an earlier day, starting fresh");
                        tracker.reset(now);
                    } else {
                        // Time the daemon was not running is not usage
                        tracker.resume(now);
                    }
                    tracker
                }
                Some(tracker) => {
                    info!(
                        persisted = %tracker.allowance(),
                        configured = %allowance_policy.daily,
                        "Configured allowance changed, starting fresh"
                    );
                    AllowanceTracker::new(allowance_policy.daily, now)
                }
                None => AllowanceTracker::new(allowance_policy.daily, now),
            }
        });

        info!(
            rule_count = rules.len(),
            max_rules = rules.capacity(),
            block_policy = ?policy.daemon.block_policy,
            remaining_allowance = ?allowance.as_ref().map(|t| t.remaining_duration().to_string()),
            "Discipline engine initialized"
        );

        Ok(Self {
            rules,
            allowance,
            reset_allowance_daily,
            block_policy: policy.daemon.block_policy,
        })
    }

    pub fn rules(&self) -> &RuleGroup {
        &self.rules
    }

    pub fn rule(&self, rule_id: &RuleId) -> Option<&Rule> {
        self.rules.get(rule_id)
    }

    pub fn allowance(&self) -> Option<&AllowanceTracker> {
        self.allowance.as_ref()
    }

    pub fn block_policy(&self) -> BlockPolicy {
        self.block_policy
    }

    /// Snapshot of every rule's protector, for persistence
    pub fn protector_states(&self) -> ProtectorStates {
        let mut states = ProtectorStates::new();
        for (rule_id, rule) in self.rules.iter() {
            states.insert(rule_id, ProtectorState::capture(rule.protector()));
        }
        states
    }

    /// Put protectors back into the state saved by a previous run.
    ///
    /// Rules without a saved state keep their configured state, and so do
    /// rules whose saved state does not fit their protector. Returns how many
    /// rules were restored.
    pub fn restore_protector_states(&mut self, states: &ProtectorStates) -> usize {
        let mut restored = 0;
        for (rule_id, rule) in self.rules.iter_mut() {
            let Some(state) = states.get(rule_id) else {
                continue;
            };
            match state.apply(rule.protector_mut()) {
                Ok(()) => {
                    debug!(rule_id = %rule_id, state = state.name(), "Protector state restored");
                    restored += 1;
                }
                Err(e) => {
                    warn!(rule_id = %rule_id, error = %e, "Ignoring saved protector state");
                }
            }
        }
        info!(restored, saved = states.len(), "Protector states restored");
        restored
    }

    /// Advance every countdown to `now` and report the transitions that happened.
    pub fn synchronize(&mut self, now: DateTime) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        let mut lifted = Vec::new();
        for (rule_id, rule) in self.rules.iter_mut() {
            let was_protected = rule.is_protected();
            rule.synchronize(now);
            if was_protected && !rule.is_protected() {
                lifted.push(rule_id.clone());
            }
        }
        lifted.sort();
        for rule_id in lifted {
            info!(rule_id = %rule_id, "Rule protection lifted");
            events.push(CoreEvent::ProtectionLifted { rule_id });
        }

        if let Some(tracker) = &mut self.allowance {
            if self.reset_allowance_daily
                && tracker.previous_synchronization_time().local_date() != now.local_date()
            {
                tracker.reset(now);
                info!(allowance = %tracker.allowance(), "Daily allowance reset");
                events.push(CoreEvent::AllowanceReset {
                    allowance: tracker.allowance(),
                });
            } else {
                let was_up = tracker.is_allowance_up();
                tracker.synchronize(now);
                debug!(
                    remaining_ms = tracker.remaining_duration().milliseconds(),
                    "Allowance synchronized"
                );
                if !was_up && tracker.is_allowance_up() {
                    info!(allowance = %tracker.allowance(), "Daily allowance exhausted");
                    events.push(CoreEvent::AllowanceExhausted {
                        allowance: tracker.allowance(),
                    });
                }
            }
        }

        events
    }

    /// Decide whether access is blocked at the given local weekday and time.
    pub fn access_decision(&self, weekday: Weekday, time: Time) -> AccessDecision {
        let mut reasons = Vec::new();

        let rules_block = match self.block_policy {
            BlockPolicy::Any => self.rules.is_any_rule_effective(weekday, time),
            BlockPolicy::All => self.rules.are_all_rules_effective(weekday, time),
        };
        if rules_block {
            let mut effective: Vec<&RuleId> = self
                .rules
                .iter()
                .filter(|(_, rule)| rule.is_effective(weekday, time))
                .map(|(rule_id, _)| rule_id)
                .collect();
            effective.sort();
            reasons.extend(effective.into_iter().map(|rule_id| BlockReason::RuleEffective {
                rule_id: rule_id.clone(),
            }));
        }

        if let Some(tracker) = &self.allowance
            && tracker.is_allowance_up()
        {
            reasons.push(BlockReason::AllowanceUp {
                allowance: tracker.allowance(),
            });
        }

        if reasons.is_empty() {
            return AccessDecision::allowed();
        }
        AccessDecision {
            blocked: true,
            reasons,
        }
    }

    /// [`Self::access_decision`] at the local weekday and time of `now`
    pub fn access_decision_at(&self, now: DateTime) -> AccessDecision {
        let (weekday, time) = now.local_weekday_and_time();
        self.access_decision(weekday, time)
    }

    /// Plead for a plea-protected rule to be lifted after its grace period.
    pub fn plead(&mut self, rule_id: &RuleId, now: DateTime) -> Result<DeactivateOutcome> {
        let conditional = self.plea_protector(rule_id)?;
        let outcome = conditional.deactivate(now);
        info!(
            rule_id = %rule_id,
            outcome = ?outcome,
            grace = %conditional.duration(),
            "Plea received"
        );
        Ok(outcome)
    }

    /// Re-arm a plea-protected rule, cancelling any plea in progress.
    pub fn rearm(&mut self, rule_id: &RuleId) -> Result<ActivateOutcome> {
        let conditional = self.plea_protector(rule_id)?;
        let outcome = conditional.activate();
        info!(rule_id = %rule_id, outcome = ?outcome, "Rule re-armed");
        Ok(outcome)
    }

    /// Start (or restart) a countdown-protected rule.
    pub fn start_countdown(&mut self, rule_id: &RuleId, now: DateTime) -> Result<()> {
        let rule = self.rule_mut(rule_id)?;
        match rule.protector_mut() {
            RuleProtector::Countdown(conditional) => {
                conditional.start(now);
                info!(rule_id = %rule_id, duration = %conditional.duration(), "Countdown started");
                Ok(())
            }
            other => Err(DisciplineError::WrongProtectorKind {
                rule_id: rule_id.clone(),
                expected: "countdown",
                actual: other.kind(),
            }),
        }
    }

    pub fn insert_rule(&mut self, rule_policy: &RulePolicy, now: DateTime) -> Result<()> {
        self.rules
            .insert(rule_policy.id.clone(), build_rule(rule_policy, now))?;
        info!(rule_id = %rule_policy.id, label = %rule_policy.label, "Rule added");
        Ok(())
    }

    pub fn remove_rule(&mut self, rule_id: &RuleId) -> Result<Rule> {
        let rule = self
            .rules
            .remove(rule_id)
            .ok_or_else(|| DisciplineError::RuleNotFound(rule_id.clone()))?;
        info!(rule_id = %rule_id, "Rule removed");
        Ok(rule)
    }

    fn rule_mut(&mut self, rule_id: &RuleId) -> Result<&mut Rule> {
        self.rules
            .get_mut(rule_id)
            .ok_or_else(|| DisciplineError::RuleNotFound(rule_id.clone()))
    }

    fn plea_protector(&mut self, rule_id: &RuleId) -> Result<&mut CountdownAfterPleaConditional> {
        let rule = self.rule_mut(rule_id)?;
        match rule.protector_mut() {
            RuleProtector::CountdownAfterPlea(conditional) => Ok(conditional),
            other => Err(DisciplineError::WrongProtectorKind {
                rule_id: rule_id.clone(),
                expected: "countdown_after_plea",
                actual: other.kind(),
            }),
        }
    }
}

fn build_rule(rule_policy: &RulePolicy, now: DateTime) -> Rule {
    let activator = match rule_policy.activator {
        ActivatorPolicy::Always => RuleActivator::Always(AlwaysConditional::new()),
        ActivatorPolicy::Time { weekdays, range } => {
            RuleActivator::Time(TimeConditional::new(weekdays, range))
        }
    };
    let protector = match rule_policy.protector {
        ProtectorPolicy::Countdown {
            duration,
            start_immediately,
        } => {
            let mut conditional = CountdownConditional::new(duration);
            if start_immediately {
                conditional.start(now);
            }
            RuleProtector::Countdown(conditional)
        }
        ProtectorPolicy::CountdownAfterPlea { grace } => {
            RuleProtector::CountdownAfterPlea(CountdownAfterPleaConditional::new(grace))
        }
    };
    Rule::new(activator, protector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Countdown;
    use chrono::{Local, TimeZone};
    use discipline_config::{AllowancePolicy, DaemonConfig};
    use discipline_util::{TimeRange, WeekdaySet};

    fn local(day: u32, hour: u32, minute: u32) -> DateTime {
        // 2025-01-06 is a Monday
        DateTime::from_chrono(&Local.with_ymd_and_hms(2025, 1, day, hour, minute, 0).unwrap())
    }

    fn minutes(m: u64) -> Duration {
        Duration::from_minutes(m).unwrap()
    }

    fn hm(hour: u8, minute: u8) -> Time {
        Time::from_hour_and_minute(hour, minute).unwrap()
    }

    fn bedtime() -> RulePolicy {
        RulePolicy {
            id: RuleId::new("bedtime"),
            label: "Bedtime".into(),
            activator: ActivatorPolicy::Time {
                weekdays: WeekdaySet::ALL,
                range: TimeRange::from_times(hm(19, 0), hm(4, 0)),
            },
            protector: ProtectorPolicy::CountdownAfterPlea { grace: minutes(30) },
        }
    }

    fn focus(start_immediately: bool) -> RulePolicy {
        RulePolicy {
            id: RuleId::new("focus"),
            label: "Focus".into(),
            activator: ActivatorPolicy::Always,
            protector: ProtectorPolicy::Countdown {
                duration: minutes(90),
                start_immediately,
            },
        }
    }

    fn make_policy(rules: Vec<RulePolicy>, allowance: Option<AllowancePolicy>) -> Policy {
        Policy {
            daemon: DaemonConfig::default(),
            allowance,
            rules,
        }
    }

    fn daily(m: u64) -> Option<AllowancePolicy> {
        Some(AllowancePolicy {
            daily: minutes(m),
            reset_daily: true,
        })
    }

    #[test]
    fn test_bedtime_blocks_until_plea_expires() {
        let policy = make_policy(vec![bedtime()], None);
        let start = local(6, 20, 0);
        let mut engine = DisciplineEngine::from_policy(&policy, None, start).unwrap();

        let decision = engine.access_decision(Weekday::Mon, hm(20, 0));
        assert!(decision.blocked);
        assert_eq!(
            decision.reasons,
            vec![BlockReason::RuleEffective {
                rule_id: RuleId::new("bedtime")
            }]
        );
        assert!(!engine.access_decision(Weekday::Mon, hm(12, 0)).blocked);

        let id = RuleId::new("bedtime");
        assert_eq!(engine.plead(&id, start).unwrap(), DeactivateOutcome::Success);
        assert!(engine.synchronize(local(6, 20, 15)).is_empty());
        assert!(engine.access_decision(Weekday::Mon, hm(20, 15)).blocked);

        let events = engine.synchronize(local(6, 20, 31));
        assert_eq!(events, vec![CoreEvent::ProtectionLifted { rule_id: id.clone() }]);
        assert!(!engine.access_decision(Weekday::Mon, hm(20, 31)).blocked);

        assert_eq!(engine.rearm(&id).unwrap(), ActivateOutcome::Success);
        assert!(engine.access_decision(Weekday::Mon, hm(20, 32)).blocked);
    }

    #[test]
    fn test_countdown_rule_start() {
        let policy = make_policy(vec![focus(false)], None);
        let start = local(6, 9, 0);
        let mut engine = DisciplineEngine::from_policy(&policy, None, start).unwrap();
        let id = RuleId::new("focus");

        assert!(!engine.access_decision(Weekday::Mon, hm(9, 0)).blocked);
        engine.start_countdown(&id, start).unwrap();
        assert!(engine.access_decision(Weekday::Mon, hm(9, 0)).blocked);

        engine.synchronize(local(6, 10, 29));
        assert!(engine.access_decision(Weekday::Mon, hm(10, 29)).blocked);

        let events = engine.synchronize(local(6, 10, 30));
        assert_eq!(events, vec![CoreEvent::ProtectionLifted { rule_id: id }]);
    }

    #[test]
    fn test_start_immediately() {
        let policy = make_policy(vec![focus(true)], None);
        let engine = DisciplineEngine::from_policy(&policy, None, local(6, 9, 0)).unwrap();
        assert!(engine.rules().is_any_rule_protected());
    }

    #[test]
    fn test_wrong_protector_kind() {
        let policy = make_policy(vec![bedtime(), focus(false)], None);
        let now = local(6, 9, 0);
        let mut engine = DisciplineEngine::from_policy(&policy, None, now).unwrap();

        assert!(matches!(
            engine.plead(&RuleId::new("focus"), now),
            Err(DisciplineError::WrongProtectorKind {
                expected: "countdown_after_plea",
                actual: "countdown",
                ..
            })
        ));
        assert!(matches!(
            engine.start_countdown(&RuleId::new("bedtime"), now),
            Err(DisciplineError::WrongProtectorKind { .. })
        ));
        assert!(matches!(
            engine.rearm(&RuleId::new("missing")),
            Err(DisciplineError::RuleNotFound(_))
        ));
    }

    #[test]
    fn test_block_policy_all() {
        let mut policy = make_policy(vec![bedtime(), focus(true)], None);
        policy.daemon.block_policy = BlockPolicy::All;
        let mut engine = DisciplineEngine::from_policy(&policy, None, local(6, 20, 0)).unwrap();

        let decision = engine.access_decision(Weekday::Mon, hm(20, 0));
        assert_eq!(decision.reasons.len(), 2);

        // Only focus is effective at noon
        assert!(!engine.access_decision(Weekday::Mon, hm(12, 0)).blocked);

        engine.remove_rule(&RuleId::new("focus")).unwrap();
        assert!(engine.access_decision(Weekday::Mon, hm(20, 0)).blocked);
    }

    #[test]
    fn test_allowance_exhaustion_and_daily_reset() {
        let policy = make_policy(vec![], daily(60));
        let mut engine = DisciplineEngine::from_policy(&policy, None, local(6, 10, 0)).unwrap();

        assert!(engine.synchronize(local(6, 10, 30)).is_empty());
        let events = engine.synchronize(local(6, 11, 0));
        assert_eq!(events, vec![CoreEvent::AllowanceExhausted { allowance: minutes(60) }]);
        assert_eq!(
            engine.access_decision(Weekday::Mon, hm(11, 0)).reasons,
            vec![BlockReason::AllowanceUp { allowance: minutes(60) }]
        );
        // Reported once
        assert!(engine.synchronize(local(6, 12, 0)).is_empty());

        let events = engine.synchronize(local(7, 8, 0));
        assert_eq!(events, vec![CoreEvent::AllowanceReset { allowance: minutes(60) }]);
        assert!(!engine.access_decision(Weekday::Tue, hm(8, 0)).blocked);
        assert_eq!(engine.allowance().unwrap().remaining_duration(), minutes(60));
    }

    #[test]
    fn test_persisted_allowance_is_resumed() {
        let policy = make_policy(vec![], daily(60));
        let mut persisted = AllowanceTracker::new(minutes(60), local(6, 10, 0));
        persisted.synchronize(local(6, 10, 20));

        let engine =
            DisciplineEngine::from_policy(&policy, Some(persisted.clone()), local(6, 15, 0))
                .unwrap();
        let tracker = engine.allowance().unwrap();
        assert_eq!(tracker.remaining_duration(), minutes(40));
        assert_eq!(tracker.previous_synchronization_time(), local(6, 15, 0));

        // A new day starts fresh
        let engine =
            DisciplineEngine::from_policy(&policy, Some(persisted.clone()), local(7, 9, 0))
                .unwrap();
        assert_eq!(engine.allowance().unwrap().remaining_duration(), minutes(60));

        // So does a changed allowance
        let engine =
            DisciplineEngine::from_policy(&make_policy(vec![], daily(90)), Some(persisted), local(6, 15, 0))
                .unwrap();
        assert_eq!(engine.allowance().unwrap().remaining_duration(), minutes(90));
    }

    #[test]
    fn test_overfull_persisted_allowance_is_replaced() {
        let policy = make_policy(vec![], daily(120));
        let overfull = AllowanceTracker::construct(
            minutes(120),
            Countdown::construct(Duration::MAX, local(6, 8, 0)),
        );

        let mut engine =
            DisciplineEngine::from_policy(&policy, Some(overfull), local(6, 8, 0)).unwrap();
        assert_eq!(engine.allowance().unwrap().remaining_duration(), minutes(120));

        let events = engine.synchronize(local(6, 10, 0));
        assert_eq!(events, vec![CoreEvent::AllowanceExhausted { allowance: minutes(120) }]);
    }

    #[test]
    fn test_protector_states_survive_restart() {
        let policy = make_policy(vec![bedtime(), focus(true)], None);
        let mut engine = DisciplineEngine::from_policy(&policy, None, local(6, 19, 0)).unwrap();
        let bedtime_id = RuleId::new("bedtime");
        let focus_id = RuleId::new("focus");

        engine.plead(&bedtime_id, local(6, 19, 0)).unwrap();
        engine.synchronize(local(6, 19, 20));
        let saved = engine.protector_states();
        assert_eq!(saved.len(), 2);

        // Restarted half an hour later: the focus countdown started at 19:00
        // is not started again, and the plea keeps its grace period
        let restart = local(6, 19, 50);
        let mut engine = DisciplineEngine::from_policy(&policy, None, restart).unwrap();
        assert_eq!(engine.restore_protector_states(&saved), 2);

        let events = engine.synchronize(restart);
        assert_eq!(
            events,
            vec![CoreEvent::ProtectionLifted { rule_id: bedtime_id.clone() }]
        );
        let Some(RuleProtector::Countdown(countdown)) = engine.rule(&focus_id).map(Rule::protector)
        else {
            panic!("expected countdown protector");
        };
        assert_eq!(
            countdown.countdown().map(|c| c.remaining_duration()),
            Some(minutes(40))
        );
    }

    #[test]
    fn test_mismatched_protector_state_is_ignored() {
        let policy = make_policy(vec![bedtime()], None);
        let mut engine = DisciplineEngine::from_policy(&policy, None, local(6, 19, 0)).unwrap();

        let mut saved = ProtectorStates::new();
        saved.insert(&RuleId::new("bedtime"), ProtectorState::Idle);
        saved.insert(&RuleId::new("gone"), ProtectorState::Deactivated);

        assert_eq!(engine.restore_protector_states(&saved), 0);
        assert!(engine.rules().is_any_rule_protected());
    }

    #[test]
    fn test_insert_and_capacity() {
        let mut policy = make_policy(vec![bedtime()], None);
        policy.daemon.max_rules = 1;
        let now = local(6, 9, 0);
        let mut engine = DisciplineEngine::from_policy(&policy, None, now).unwrap();

        assert!(matches!(
            engine.insert_rule(&focus(false), now),
            Err(DisciplineError::RuleGroupFull { capacity: 1 })
        ));
        engine.remove_rule(&RuleId::new("bedtime")).unwrap();
        engine.insert_rule(&focus(false), now).unwrap();
        assert!(engine.rule(&RuleId::new("focus")).is_some());
        assert!(matches!(
            engine.remove_rule(&RuleId::new("bedtime")),
            Err(DisciplineError::RuleNotFound(_))
        ));
    }
}
