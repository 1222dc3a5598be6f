//! Rules: an activator window gated by a protector

use discipline_util::{DateTime, Time, Weekday};

use crate::{
    AlwaysConditional, CountdownAfterPleaConditional, CountdownConditional, TimeConditional,
};

/// Decides when a rule's window is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleActivator {
    Always(AlwaysConditional),
    Time(TimeConditional),
}

impl RuleActivator {
    pub fn is_effective(&self, weekday: Weekday, time: Time) -> bool {
        match self {
            RuleActivator::Always(conditional) => conditional.is_effective(),
            RuleActivator::Time(conditional) => conditional.is_effective(weekday, time),
        }
    }
}

/// Decides whether a rule is still protecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleProtector {
    Countdown(CountdownConditional),
    CountdownAfterPlea(CountdownAfterPleaConditional),
}

impl RuleProtector {
    pub fn is_effective(&self) -> bool {
        match self {
            RuleProtector::Countdown(conditional) => conditional.is_effective(),
            RuleProtector::CountdownAfterPlea(conditional) => conditional.is_effective(),
        }
    }

    pub fn synchronize(&mut self, now: DateTime) {
        match self {
            RuleProtector::Countdown(conditional) => conditional.synchronize(now),
            RuleProtector::CountdownAfterPlea(conditional) => conditional.synchronize(now),
        }
    }

    /// Kind name for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            RuleProtector::Countdown(_) => "countdown",
            RuleProtector::CountdownAfterPlea(_) => "countdown_after_plea",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    activator: RuleActivator,
    protector: RuleProtector,
}

impl Rule {
    pub fn new(activator: RuleActivator, protector: RuleProtector) -> Self {
        Self {
            activator,
            protector,
        }
    }

    pub fn activator(&self) -> &RuleActivator {
        &self.activator
    }

    pub fn protector(&self) -> &RuleProtector {
        &self.protector
    }

    pub fn protector_mut(&mut self) -> &mut RuleProtector {
        &mut self.protector
    }

    /// Blocking right now: protected and inside the activator's window
    pub fn is_effective(&self, weekday: Weekday, time: Time) -> bool {
        self.protector.is_effective() && self.activator.is_effective(weekday, time)
    }

    pub fn is_protected(&self) -> bool {
        self.protector.is_effective()
    }

    pub fn synchronize(&mut self, now: DateTime) {
        self.protector.synchronize(now);
    }
}
