//! Trait contract tests for ProjectMemory.
//!
//! These tests verify the behavioral contract of the storage trait using the
//! in-memory implementation. Any conforming backend must pass them.

use std::sync::Arc;

use serde_json::json;
use taskloom_state::fakes::MemoryProjectMemory;
use taskloom_state::storage_traits::*;
use taskloom_state::StorageError;

fn scope() -> ArtifactScope {
    ArtifactScope::default()
}

// ===========================================================================
// Versioning
// ===========================================================================

#[tokio::test]
async fn first_put_is_version_one() {
    let memory = MemoryProjectMemory::new();
    let artifact = memory
        .put(&scope(), "task:a", json!({"ok": true}), json!({}), "task_result")
        .await
        .unwrap();

    assert_eq!(artifact.version, 1);
    assert_eq!(artifact.key, "task:a");
    assert_eq!(artifact.artifact_type, "task_result");
    assert_eq!(artifact.tenant_id, "default");
    assert_eq!(artifact.data, json!({"ok": true}));
}

#[tokio::test]
async fn versions_increase_per_key() {
    let memory = MemoryProjectMemory::new();
    for i in 0..3 {
        memory
            .put(&scope(), "k", json!(i), json!({}), DEFAULT_ARTIFACT_TYPE)
            .await
            .unwrap();
    }
    memory
        .put(&scope(), "other", json!("x"), json!({}), DEFAULT_ARTIFACT_TYPE)
        .await
        .unwrap();

    assert_eq!(memory.list_versions(&scope(), "k").await.unwrap(), vec![1, 2, 3]);
    assert_eq!(memory.list_versions(&scope(), "other").await.unwrap(), vec![1]);
    assert_eq!(memory.len(), 4);
}

#[tokio::test]
async fn get_without_version_returns_latest() {
    let memory = MemoryProjectMemory::new();
    memory.put(&scope(), "k", json!("v1"), json!({}), "data").await.unwrap();
    memory.put(&scope(), "k", json!("v2"), json!({}), "data").await.unwrap();

    let latest = memory.get(&scope(), "k", None).await.unwrap().unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.data, json!("v2"));

    let first = memory.get(&scope(), "k", Some(1)).await.unwrap().unwrap();
    assert_eq!(first.data, json!("v1"));
}

#[tokio::test]
async fn get_missing_returns_none() {
    let memory = MemoryProjectMemory::new();
    assert!(memory.get(&scope(), "nope", None).await.unwrap().is_none());
    memory.put(&scope(), "k", json!(1), json!({}), "data").await.unwrap();
    assert!(memory.get(&scope(), "k", Some(9)).await.unwrap().is_none());
}

#[tokio::test]
async fn list_versions_of_unknown_key_is_empty() {
    let memory = MemoryProjectMemory::new();
    assert!(memory.list_versions(&scope(), "ghost").await.unwrap().is_empty());
}

// ===========================================================================
// Scoping
// ===========================================================================

#[tokio::test]
async fn tenants_are_isolated() {
    let memory = MemoryProjectMemory::new();
    let acme = ArtifactScope::new("acme", "web");
    let globex = ArtifactScope::new("globex", "web");

    memory.put(&acme, "k", json!("acme"), json!({}), "data").await.unwrap();

    assert!(memory.get(&globex, "k", None).await.unwrap().is_none());
    let got = memory.get(&acme, "k", None).await.unwrap().unwrap();
    assert_eq!(got.tenant_id, "acme");
    assert_eq!(got.project_id, "web");
}

// ===========================================================================
// Deletion
// ===========================================================================

#[tokio::test]
async fn delete_single_version() {
    let memory = MemoryProjectMemory::new();
    memory.put(&scope(), "k", json!(1), json!({}), "data").await.unwrap();
    memory.put(&scope(), "k", json!(2), json!({}), "data").await.unwrap();

    assert!(memory.delete(&scope(), "k", Some(1)).await.unwrap());
    assert_eq!(memory.list_versions(&scope(), "k").await.unwrap(), vec![2]);
    assert!(!memory.delete(&scope(), "k", Some(1)).await.unwrap());
}

#[tokio::test]
async fn delete_all_versions() {
    let memory = MemoryProjectMemory::new();
    memory.put(&scope(), "k", json!(1), json!({}), "data").await.unwrap();
    memory.put(&scope(), "k", json!(2), json!({}), "data").await.unwrap();

    assert!(memory.delete(&scope(), "k", None).await.unwrap());
    assert!(memory.list_versions(&scope(), "k").await.unwrap().is_empty());
    assert!(!memory.delete(&scope(), "k", None).await.unwrap());
    assert!(memory.is_empty());
}

// ===========================================================================
// Access control
// ===========================================================================

#[tokio::test]
async fn access_check_denies_writes() {
    let access: AccessCheck = Arc::new(|_, _, _, op| op != Operation::Write);
    let memory = MemoryProjectMemory::with_access_check(access);

    let err = memory
        .put(&scope(), "task:x", json!(1), json!({}), "data")
        .await
        .unwrap_err();

    match err {
        StorageError::PermissionDenied { key, operation, .. } => {
            assert_eq!(key, "task:x");
            assert_eq!(operation, Operation::Write);
        }
        other => panic!("expected PermissionDenied, got {other:?}"),
    }
    assert!(memory.is_empty());
    // Reads remain allowed.
    assert!(memory.get(&scope(), "task:x", None).await.unwrap().is_none());
}

#[tokio::test]
async fn access_check_sees_tenant_project_and_key() {
    let access: AccessCheck = Arc::new(|tenant, project, key, _| {
        tenant == "acme" && project == "web" && key.starts_with("task:")
    });
    let memory = MemoryProjectMemory::with_access_check(access);
    let acme = ArtifactScope::new("acme", "web");

    assert!(memory.put(&acme, "task:1", json!(1), json!({}), "data").await.is_ok());
    assert!(memory.put(&acme, "secret", json!(1), json!({}), "data").await.is_err());
    assert!(memory.list_versions(&scope(), "task:1").await.is_err());
    assert!(memory.delete(&ArtifactScope::new("acme", "api"), "task:1", None).await.is_err());
}
