//! Mapping plan steps to executable work.

use std::collections::HashMap;

use crate::orchestrator::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::step::PlanStep;
use crate::orchestrator::work::WorkItem;

/// Resolves a step to the work item the orchestrator will run.
///
/// Implementations fail with [`OrchestratorError::MissingWork`] when the
/// step carries nothing they can execute.
pub trait StepResolver: Send + Sync {
    fn resolve(&self, step: &PlanStep, step_id: &str) -> OrchestratorResult<WorkItem>;
}

/// Uses the work item carried on the step itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineResolver;

impl StepResolver for InlineResolver {
    fn resolve(&self, step: &PlanStep, step_id: &str) -> OrchestratorResult<WorkItem> {
        step.work
            .clone()
            .ok_or_else(|| OrchestratorError::MissingWork {
                step_id: step_id.to_string(),
            })
    }
}

/// Looks work up by the step's `agent` name, preferring inline work when a
/// step has both.
#[derive(Debug, Clone, Default)]
pub struct RegistryResolver {
    agents: HashMap<String, WorkItem>,
}

impl RegistryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the work run for `agent`.
    pub fn register(&mut self, agent: impl Into<String>, work: WorkItem) -> &mut Self {
        self.agents.insert(agent.into(), work);
        self
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.agents.contains_key(agent)
    }
}

impl StepResolver for RegistryResolver {
    fn resolve(&self, step: &PlanStep, step_id: &str) -> OrchestratorResult<WorkItem> {
        if let Some(work) = &step.work {
            return Ok(work.clone());
        }
        step.agent
            .as_deref()
            .and_then(|agent| self.agents.get(agent))
            .cloned()
            .ok_or_else(|| OrchestratorError::MissingWork {
                step_id: step_id.to_string(),
            })
    }
}
