//! Dependency-driven concurrent execution of named work items.

pub mod error;
pub mod executor;

pub use error::{ItemFailure, ParallelError, ParallelResult};
pub use executor::{DagItem, ParallelExecutor, PARALLEL_AGENT};
