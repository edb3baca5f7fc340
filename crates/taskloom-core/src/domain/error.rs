//! Error types for task graph construction and identity.

use thiserror::Error;

/// Errors produced while building or validating a [`crate::domain::TaskGraph`].
#[derive(Debug, Error)]
pub enum GraphError {
    /// The dependency edges contain at least one cycle.
    ///
    /// Only the number of nodes Kahn's algorithm could not process is
    /// reported; cycle members are not identified.
    #[error("task graph contains a cycle: {unresolved} of {total} tasks could not be ordered")]
    Cycle { unresolved: usize, total: usize },

    /// Two tasks resolved to the same id.
    #[error("duplicate task id in graph: {id}")]
    DuplicateTask { id: String },

    /// A task depends on an id that is not part of the graph.
    #[error("task {task_id} depends on unknown task {dependency}")]
    UnknownDependency { task_id: String, dependency: String },

    /// A value cannot be represented in canonical JSON.
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_reports_counts_only() {
        let err = GraphError::Cycle {
            unresolved: 2,
            total: 5,
        };
        assert_eq!(
            err.to_string(),
            "task graph contains a cycle: 2 of 5 tasks could not be ordered"
        );
    }

    #[test]
    fn unknown_dependency_names_both_ids() {
        let err = GraphError::UnknownDependency {
            task_id: "aaaa".to_string(),
            dependency: "bbbb".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aaaa"));
        assert!(msg.contains("bbbb"));
    }
}
