//! Error types for the execution orchestrator.

use taskloom_state::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The resolver found nothing to execute for a step.
    #[error("no work item found in step {step_id}")]
    MissingWork { step_id: String },

    /// An attempt exceeded the step's timeout.
    ///
    /// Only waiting stops: a blocking work item keeps running on its worker
    /// thread after this is reported.
    #[error("step {step_id} timed out after {limit_ms}ms")]
    Timeout { step_id: String, limit_ms: u64 },

    /// The work item returned an error or panicked.
    #[error("step {step_id} failed on attempt {attempt}: {source}")]
    WorkFailed {
        step_id: String,
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Persisting the step result failed. Never retried.
    #[error("step {step_id} result could not be stored: {source}")]
    Storage {
        step_id: String,
        #[source]
        source: StorageError,
    },
}

impl OrchestratorError {
    /// Message carried by `task.failed` and `escalation.needed` events:
    /// the work item's own error text, or this error's display otherwise.
    pub fn failure_message(&self) -> String {
        match self {
            OrchestratorError::WorkFailed { source, .. } => source.to_string(),
            OrchestratorError::Storage { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, OrchestratorError::Timeout { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, OrchestratorError::Storage { source, .. } if source.is_permission_denied())
    }
}

/// Convenience result alias.
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
