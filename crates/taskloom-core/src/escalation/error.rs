//! Error types for escalation policy construction.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EscalationError {
    #[error("escalation chain must have at least one level")]
    EmptyChain,

    #[error("backoff schedule must have at least one entry")]
    EmptyBackoff,

    #[error("invalid budget: {0}")]
    InvalidBudget(f64),
}

/// Convenience result alias.
pub type EscalationResult<T> = std::result::Result<T, EscalationError>;
