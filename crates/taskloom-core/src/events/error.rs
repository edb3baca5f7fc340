//! Error types for the event fabric.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    /// A subscription pattern is not valid glob syntax.
    #[error("invalid subscription pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("event log io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias.
pub type EventResult<T> = std::result::Result<T, EventError>;
