//! Error types for taskloom-state

use thiserror::Error;

use crate::storage_traits::Operation;

/// Errors returned by [`crate::ProjectMemory`] implementations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The access-control predicate rejected the operation.
    #[error("permission denied: {operation} on {tenant_id}/{project_id}/{key}")]
    PermissionDenied {
        tenant_id: String,
        project_id: String,
        key: String,
        operation: Operation,
    },

    /// No artifact exists for the requested key/version.
    #[error("artifact not found: {key} (version {version:?})")]
    NotFound { key: String, version: Option<u32> },

    /// Backend I/O failure
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// True for errors that must surface immediately instead of being retried.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StorageError::PermissionDenied { .. })
    }
}
