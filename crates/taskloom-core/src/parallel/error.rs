//! Error types for the parallel executor.

use thiserror::Error;

/// One item that returned an error, panicked or timed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub name: String,
    pub error: String,
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

#[derive(Debug, Error)]
pub enum ParallelError {
    #[error("duplicate item name: {name}")]
    DuplicateItem { name: String },

    #[error("item {item} depends on unknown item {dependency}")]
    UnknownDependency { item: String, dependency: String },

    #[error("item dependencies contain a cycle: {unresolved} of {total} items unreachable")]
    Cycle { unresolved: usize, total: usize },

    /// At least one item failed; everything not yet finished was cancelled.
    #[error("{} item(s) failed [{}]; {} cancelled", .failed.len(), join(.failed), .cancelled.len())]
    ItemsFailed {
        failed: Vec<ItemFailure>,
        cancelled: Vec<String>,
    },
}

fn join(failed: &[ItemFailure]) -> String {
    failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ParallelError {
    /// Names of failed items, empty for validation errors.
    pub fn failed_items(&self) -> Vec<&str> {
        match self {
            ParallelError::ItemsFailed { failed, .. } => {
                failed.iter().map(|f| f.name.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Convenience result alias.
pub type ParallelResult<T> = std::result::Result<T, ParallelError>;
