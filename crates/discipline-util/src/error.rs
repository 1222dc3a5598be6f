//! Error types for discipline

use thiserror::Error;

use crate::RuleId;

/// Core error type for rule and engine operations
#[derive(Debug, Error)]
pub enum DisciplineError {
    #[error("Rule not found: {0}")]
    RuleNotFound(RuleId),

    #[error("Rule already exists: {0}")]
    DuplicateRule(RuleId),

    #[error("Rule group is full ({capacity} rules)")]
    RuleGroupFull { capacity: usize },

    #[error("Rule '{rule_id}' has a {actual} protector, expected {expected}")]
    WrongProtectorKind {
        rule_id: RuleId,
        expected: &'static str,
        actual: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, DisciplineError>;
