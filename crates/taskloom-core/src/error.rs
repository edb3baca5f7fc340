//! Crate-wide error type.
//!
//! Each subsystem returns its own error enum; [`TaskloomError`] wraps them
//! for callers that drive several subsystems and want a single `?` target.

use taskloom_state::StorageError;
use thiserror::Error;

use crate::domain::GraphError;
use crate::escalation::EscalationError;
use crate::events::EventError;
use crate::orchestrator::OrchestratorError;
use crate::parallel::ParallelError;

#[derive(Debug, Error)]
pub enum TaskloomError {
    #[error("task graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("event fabric error: {0}")]
    Event(#[from] EventError),

    #[error("parallel execution error: {0}")]
    Parallel(#[from] ParallelError),

    #[error("escalation policy error: {0}")]
    Escalation(#[from] EscalationError),

    #[error("orchestration error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, TaskloomError>;
