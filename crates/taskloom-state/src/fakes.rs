//! In-memory implementation of [`ProjectMemory`]
//!
//! `MemoryProjectMemory` keeps every version of every key in a
//! `HashMap<(tenant, project, key), Vec<Artifact>>`. It is the default
//! backend for tests and single-process runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::*;

type ScopedKey = (String, String, String);

// ---------------------------------------------------------------------------
// MemoryProjectMemory
// ---------------------------------------------------------------------------

/// In-memory versioned artifact store with a pluggable access check.
pub struct MemoryProjectMemory {
    entries: Mutex<HashMap<ScopedKey, Vec<Artifact>>>,
    access: AccessCheck,
}

impl Default for MemoryProjectMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryProjectMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProjectMemory").finish_non_exhaustive()
    }
}

impl MemoryProjectMemory {
    /// Store that allows every operation.
    pub fn new() -> Self {
        Self::with_access_check(allow_all())
    }

    /// Store gated by `access`.
    pub fn with_access_check(access: AccessCheck) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            access,
        }
    }

    /// Total number of stored versions across all keys.
    pub fn len(&self) -> usize {
        self.entries().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ScopedKey, Vec<Artifact>>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, scope: &ArtifactScope, key: &str, operation: Operation) -> StorageResult<()> {
        if (self.access)(&scope.tenant_id, &scope.project_id, key, operation) {
            Ok(())
        } else {
            Err(StorageError::PermissionDenied {
                tenant_id: scope.tenant_id.clone(),
                project_id: scope.project_id.clone(),
                key: key.to_string(),
                operation,
            })
        }
    }
}

fn scoped(scope: &ArtifactScope, key: &str) -> ScopedKey {
    (
        scope.tenant_id.clone(),
        scope.project_id.clone(),
        key.to_string(),
    )
}

#[async_trait]
impl ProjectMemory for MemoryProjectMemory {
    async fn put(
        &self,
        scope: &ArtifactScope,
        key: &str,
        data: serde_json::Value,
        meta: serde_json::Value,
        artifact_type: &str,
    ) -> StorageResult<Artifact> {
        self.check(scope, key, Operation::Write)?;

        let mut entries = self.entries();
        let versions = entries.entry(scoped(scope, key)).or_default();
        let version = versions.last().map(|a| a.version + 1).unwrap_or(1);
        let artifact = Artifact {
            id: uuid::Uuid::new_v4().to_string(),
            artifact_type: artifact_type.to_string(),
            tenant_id: scope.tenant_id.clone(),
            project_id: scope.project_id.clone(),
            key: key.to_string(),
            version,
            created_at: Utc::now(),
            meta,
            data,
        };
        versions.push(artifact.clone());
        debug!(key = %key, version, "artifact stored");
        Ok(artifact)
    }

    async fn get(
        &self,
        scope: &ArtifactScope,
        key: &str,
        version: Option<u32>,
    ) -> StorageResult<Option<Artifact>> {
        self.check(scope, key, Operation::Read)?;

        let entries = self.entries();
        let Some(versions) = entries.get(&scoped(scope, key)) else {
            return Ok(None);
        };
        let found = match version {
            Some(v) => versions.iter().find(|a| a.version == v),
            None => versions.last(),
        };
        Ok(found.cloned())
    }

    async fn list_versions(&self, scope: &ArtifactScope, key: &str) -> StorageResult<Vec<u32>> {
        self.check(scope, key, Operation::List)?;

        let entries = self.entries();
        Ok(entries
            .get(&scoped(scope, key))
            .map(|versions| versions.iter().map(|a| a.version).collect())
            .unwrap_or_default())
    }

    async fn delete(
        &self,
        scope: &ArtifactScope,
        key: &str,
        version: Option<u32>,
    ) -> StorageResult<bool> {
        self.check(scope, key, Operation::Delete)?;

        let mut entries = self.entries();
        let id = scoped(scope, key);
        let removed = match version {
            None => entries.remove(&id).is_some_and(|v| !v.is_empty()),
            Some(v) => match entries.get_mut(&id) {
                Some(versions) => {
                    let before = versions.len();
                    versions.retain(|a| a.version != v);
                    let removed = versions.len() != before;
                    if versions.is_empty() {
                        entries.remove(&id);
                    }
                    removed
                }
                None => false,
            },
        };
        Ok(removed)
    }
}
