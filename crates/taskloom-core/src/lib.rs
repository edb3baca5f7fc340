//! Taskloom Core Library
//!
//! Building blocks for running plans of dependent tasks:
//!
//! * [`domain`]: content-addressed tasks and the validated [`TaskGraph`].
//! * [`events`]: lifecycle envelopes, the glob-routed [`EventBus`], a durable
//!   JSONL [`EventLog`] and the [`DeadLetterQueue`].
//! * [`parallel`]: [`ParallelExecutor`] for bounded, dependency-ordered
//!   concurrent work.
//! * [`escalation`]: [`EscalationPolicy`] chain, backoff and budget.
//! * [`orchestrator`]: [`ExecutionOrchestrator`] running sequential steps with
//!   retry, timeout, escalation and result persistence.

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod escalation;
pub mod events;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod parallel;
pub mod telemetry;

pub use config::RuntimeConfig;
pub use context::ExecutionContext;
pub use error::{Result, TaskloomError};
pub use metrics::{MetricsSnapshot, RunMetrics};

pub use domain::{
    ArtifactDescriptor, ArtifactKind, GraphError, GraphResult, Task, TaskGraph, TaskType,
};

pub use events::{
    BusOptions, DeadLetterQueue, Event, EventBus, EventError, EventHandler, EventLog,
    EventResult, FailedEvent, Handler, LifecycleEvent,
};

pub use parallel::{DagItem, ItemFailure, ParallelError, ParallelExecutor, ParallelResult};

pub use escalation::{CostEntry, CostTracker, EscalationError, EscalationPolicy};

pub use orchestrator::{
    ExecutionOrchestrator, InlineResolver, OrchestratorError, OrchestratorResult, PlanStep,
    RegistryResolver, RetryBackoff, StepOptions, StepResolver, WorkItem, TASK_RESULT_ARTIFACT,
};

pub use taskloom_state::{
    Artifact, ArtifactScope, MemoryProjectMemory, ProjectMemory, StorageError,
};
