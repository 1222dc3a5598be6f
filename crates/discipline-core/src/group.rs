//! Capacity-bounded collection of rules

use discipline_config::DEFAULT_MAX_RULES;
use discipline_util::{DateTime, DisciplineError, RuleId, Time, Weekday};
use std::collections::HashMap;

use crate::Rule;

#[derive(Debug, Clone)]
pub struct RuleGroup {
    rules: HashMap<RuleId, Rule>,
    capacity: usize,
}

impl Default for RuleGroup {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_RULES)
    }
}

impl RuleGroup {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rules: HashMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn insert(&mut self, id: RuleId, rule: Rule) -> Result<(), DisciplineError> {
        if self.rules.contains_key(&id) {
            return Err(DisciplineError::DuplicateRule(id));
        }
        if self.rules.len() >= self.capacity {
            return Err(DisciplineError::RuleGroupFull {
                capacity: self.capacity,
            });
        }
        self.rules.insert(id, rule);
        Ok(())
    }

    pub fn remove(&mut self, id: &RuleId) -> Option<Rule> {
        self.rules.remove(id)
    }

    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.get(id)
    }

    pub fn get_mut(&mut self, id: &RuleId) -> Option<&mut Rule> {
        self.rules.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RuleId, &Rule)> {
        self.rules.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&RuleId, &mut Rule)> {
        self.rules.iter_mut()
    }

    pub fn synchronize(&mut self, now: DateTime) {
        for rule in self.rules.values_mut() {
            rule.synchronize(now);
        }
    }

    pub fn is_any_rule_effective(&self, weekday: Weekday, time: Time) -> bool {
        self.rules.values().any(|rule| rule.is_effective(weekday, time))
    }

    /// False for an empty group
    pub fn are_all_rules_effective(&self, weekday: Weekday, time: Time) -> bool {
        !self.rules.is_empty() && self.rules.values().all(|rule| rule.is_effective(weekday, time))
    }

    pub fn is_any_rule_protected(&self) -> bool {
        self.rules.values().any(Rule::is_protected)
    }
}
