//! Core events emitted by the engine

use discipline_util::{Duration, RuleId};

/// Events emitted by [`crate::DisciplineEngine::synchronize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// A rule's protector stopped protecting
    ProtectionLifted { rule_id: RuleId },

    /// The daily allowance ran out
    AllowanceExhausted { allowance: Duration },

    /// The daily allowance was refilled on a new local day
    AllowanceReset { allowance: Duration },
}
