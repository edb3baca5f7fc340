//! Storage trait definitions for Taskloom
//!
//! `ProjectMemory` is the narrow contract the execution orchestrator uses to
//! persist step results. Every key holds an ordered history of versions,
//! numbered from 1, scoped to a tenant and a project. Implementations consult
//! an [`AccessCheck`] predicate before every operation.
//!
//! All traits are async and backend-agnostic. An in-memory implementation is
//! provided via the `fakes` module.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Tenant and project used when the caller does not scope an operation.
pub const DEFAULT_SCOPE: &str = "default";

/// Artifact type recorded when the caller does not name one.
pub const DEFAULT_ARTIFACT_TYPE: &str = "data";

// ---------------------------------------------------------------------------
// Access control
// ---------------------------------------------------------------------------

/// Operation kinds gated by the access-control predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    List,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::List => "list",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Predicate `(tenant, project, key, operation) -> allowed`.
pub type AccessCheck = Arc<dyn Fn(&str, &str, &str, Operation) -> bool + Send + Sync>;

/// An access check that permits everything.
pub fn allow_all() -> AccessCheck {
    Arc::new(|_, _, _, _| true)
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Tenant/project namespace an artifact lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactScope {
    pub tenant_id: String,
    pub project_id: String,
}

impl ArtifactScope {
    pub fn new(tenant_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
        }
    }
}

impl Default for ArtifactScope {
    fn default() -> Self {
        Self::new(DEFAULT_SCOPE, DEFAULT_SCOPE)
    }
}

/// One stored version of a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique id of this version (UUID v4).
    pub id: String,
    /// Free-form classification, e.g. `"task_result"`.
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub tenant_id: String,
    pub project_id: String,
    pub key: String,
    /// 1-based, strictly increasing per key.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub meta: serde_json::Value,
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// ProjectMemory
// ---------------------------------------------------------------------------

/// Versioned artifact store.
///
/// Guarantees:
/// - `put` appends a new version; the first version of a key is 1.
/// - `get(key, None)` returns the latest version.
/// - `list_versions` returns versions in ascending order.
/// - Any operation rejected by the access check fails with
///   [`StorageError::PermissionDenied`] and has no effect.
#[async_trait]
pub trait ProjectMemory: Send + Sync {
    /// Store `data` as the next version of `key`.
    async fn put(
        &self,
        scope: &ArtifactScope,
        key: &str,
        data: serde_json::Value,
        meta: serde_json::Value,
        artifact_type: &str,
    ) -> StorageResult<Artifact>;

    /// Fetch a specific version, or the latest when `version` is `None`.
    async fn get(
        &self,
        scope: &ArtifactScope,
        key: &str,
        version: Option<u32>,
    ) -> StorageResult<Option<Artifact>>;

    /// All stored versions of `key`, ascending. Empty if the key is unknown.
    async fn list_versions(&self, scope: &ArtifactScope, key: &str) -> StorageResult<Vec<u32>>;

    /// Delete one version, or every version when `version` is `None`.
    ///
    /// Returns `true` if anything was removed.
    async fn delete(
        &self,
        scope: &ArtifactScope,
        key: &str,
        version: Option<u32>,
    ) -> StorageResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scope_is_default_default() {
        let scope = ArtifactScope::default();
        assert_eq!(scope.tenant_id, "default");
        assert_eq!(scope.project_id, "default");
    }

    #[test]
    fn operation_serializes_snake_case() {
        let json = serde_json::to_string(&Operation::Delete).unwrap();
        assert_eq!(json, "\"delete\"");
        assert_eq!(Operation::List.to_string(), "list");
    }

    #[test]
    fn artifact_type_field_is_renamed() {
        let artifact = Artifact {
            id: "a".into(),
            artifact_type: "task_result".into(),
            tenant_id: "t".into(),
            project_id: "p".into(),
            key: "task:1".into(),
            version: 1,
            created_at: Utc::now(),
            meta: serde_json::json!({}),
            data: serde_json::json!(42),
        };
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["type"], "task_result");
        assert!(value.get("artifact_type").is_none());
    }
}
