//! Sequential, retry-aware plan execution.

pub mod engine;
pub mod error;
pub mod resolver;
pub mod step;
pub mod work;

pub use engine::{ExecutionOrchestrator, TASK_RESULT_ARTIFACT};
pub use error::{OrchestratorError, OrchestratorResult};
pub use resolver::{InlineResolver, RegistryResolver, StepResolver};
pub use step::{PlanStep, RetryBackoff, StepOptions};
pub use work::WorkItem;
