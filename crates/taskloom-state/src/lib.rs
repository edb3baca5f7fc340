//! Taskloom-State: project memory for step results
//!
//! This crate defines the persistence contract the execution orchestrator
//! writes successful step results through, plus an in-memory backend.
//!
//! ## Key Components
//!
//! - `ProjectMemory`: versioned artifact store scoped by tenant and project
//! - `Artifact`: a single stored version of a key
//! - `AccessCheck`: access-control predicate consulted on every operation
//! - `MemoryProjectMemory`: in-memory implementation (see `fakes`)

mod error;
pub mod fakes;
pub mod storage_traits;

pub use error::StorageError;
pub use fakes::MemoryProjectMemory;
pub use storage_traits::{
    allow_all, AccessCheck, Artifact, ArtifactScope, Operation, ProjectMemory, StorageResult,
    DEFAULT_ARTIFACT_TYPE, DEFAULT_SCOPE,
};
