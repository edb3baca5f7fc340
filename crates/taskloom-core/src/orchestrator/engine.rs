//! Sequential plan driver.
//!
//! Steps run strictly one after another. For each step:
//!
//! ```text
//! PENDING -> RUNNING(0) -> SUCCEEDED
//!                       -> BACKOFF -> RUNNING(1) -> ...   while attempts remain
//!                       -> TERMINAL_FAILURE [-> ESCALATED]
//! ```
//!
//! Each attempt emits `task.started`, then either persists the result as
//! `task:<step id>` and emits `task.completed`, or emits `task.failed`. A
//! terminal failure aborts the rest of the plan.

use std::sync::Arc;

use serde_json::json;
use taskloom_state::ProjectMemory;
use tracing::instrument;

use crate::context::ExecutionContext;
use crate::events::envelope::ORCHESTRATOR_AGENT;
use crate::events::{EventBus, LifecycleEvent};
use crate::obs::{self, PlanSpan};
use crate::orchestrator::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::resolver::{InlineResolver, StepResolver};
use crate::orchestrator::step::{PlanStep, StepOptions};
use crate::orchestrator::work::WorkItem;

/// Artifact type under which step results are stored.
pub const TASK_RESULT_ARTIFACT: &str = "task_result";

/// Result of a single attempt.
enum AttemptOutcome {
    Succeeded(serde_json::Value),
    /// May be retried if attempts remain.
    Retryable(OrchestratorError),
    /// Ends the step immediately, no retry and no escalation.
    Terminal(OrchestratorError),
}

/// Identifies the step an attempt belongs to.
struct StepRef<'a> {
    index: usize,
    id: &'a str,
}

pub struct ExecutionOrchestrator {
    bus: Arc<EventBus>,
    memory: Arc<dyn ProjectMemory>,
    resolver: Arc<dyn StepResolver>,
}

impl ExecutionOrchestrator {
    /// Orchestrator that runs the work carried on each step.
    pub fn new(bus: Arc<EventBus>, memory: Arc<dyn ProjectMemory>) -> Self {
        Self {
            bus,
            memory,
            resolver: Arc::new(InlineResolver),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn StepResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Run `steps` in order and return their results in the same order.
    ///
    /// The first step that fails terminally aborts the plan; its error is
    /// returned and later steps never start.
    #[instrument(
        name = "taskloom.plan",
        skip(self, ctx, steps),
        fields(plan_id = %ctx.plan_id, correlation_id = %ctx.correlation_id, steps = steps.len())
    )]
    pub async fn execute_plan(
        &self,
        ctx: &ExecutionContext,
        steps: &[PlanStep],
    ) -> OrchestratorResult<Vec<serde_json::Value>> {
        let span = PlanSpan::enter(&ctx.plan_id, &ctx.correlation_id, steps.len());
        let mut results = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            match self.execute_step(ctx, index, step).await {
                Ok(value) => results.push(value),
                Err(e) => {
                    span.finish(false);
                    ctx.metrics.flush();
                    return Err(e);
                }
            }
        }

        span.finish(true);
        ctx.metrics.flush();
        Ok(results)
    }

    async fn execute_step(
        &self,
        ctx: &ExecutionContext,
        index: usize,
        step: &PlanStep,
    ) -> OrchestratorResult<serde_json::Value> {
        let step_id = step.resolved_id(index);
        let work = self.resolver.resolve(step, &step_id)?;
        let options = &step.options;
        let step_ref = StepRef {
            index,
            id: &step_id,
        };

        let mut attempt: u32 = 0;
        loop {
            match self.run_attempt(ctx, &step_ref, &work, options, attempt).await {
                AttemptOutcome::Succeeded(value) => return Ok(value),
                AttemptOutcome::Terminal(err) => {
                    obs::emit_step_failed(&step_id, attempt + 1, &err);
                    return Err(err);
                }
                AttemptOutcome::Retryable(err) if attempt < options.retries => {
                    let delay = options.backoff_delay(attempt);
                    obs::emit_step_retry(&step_id, attempt, delay.as_millis() as u64, &err);
                    ctx.metrics.inc_retries();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                AttemptOutcome::Retryable(err) => {
                    if options.escalate_on_failure {
                        let reason = err.failure_message();
                        obs::emit_escalation(&step_id, &reason);
                        ctx.metrics.inc_escalations();
                        self.emit(
                            ctx,
                            LifecycleEvent::EscalationNeeded {
                                task_id: step_id.clone(),
                                reason,
                            },
                        );
                    }
                    obs::emit_step_failed(&step_id, attempt + 1, &err);
                    return Err(err);
                }
            }
        }
    }

    async fn run_attempt(
        &self,
        ctx: &ExecutionContext,
        step: &StepRef<'_>,
        work: &WorkItem,
        options: &StepOptions,
        attempt: u32,
    ) -> AttemptOutcome {
        ctx.metrics.inc_steps_started();
        obs::emit_step_started(step.id, attempt);
        self.emit(
            ctx,
            LifecycleEvent::TaskStarted {
                task_id: step.id.to_string(),
                agent_id: ORCHESTRATOR_AGENT.to_string(),
            },
        );

        let outcome = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, work.execute()).await {
                Ok(result) => result.map_err(|source| OrchestratorError::WorkFailed {
                    step_id: step.id.to_string(),
                    attempt,
                    source,
                }),
                Err(_) => Err(OrchestratorError::Timeout {
                    step_id: step.id.to_string(),
                    limit_ms: limit.as_millis() as u64,
                }),
            },
            None => work
                .execute()
                .await
                .map_err(|source| OrchestratorError::WorkFailed {
                    step_id: step.id.to_string(),
                    attempt,
                    source,
                }),
        };

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                self.fail(ctx, step.id, &err);
                return AttemptOutcome::Retryable(err);
            }
        };

        let stored = self
            .memory
            .put(
                &ctx.scope,
                &format!("task:{}", step.id),
                value.clone(),
                json!({ "step": step.index, "step_id": step.id, "attempt": attempt }),
                TASK_RESULT_ARTIFACT,
            )
            .await;
        match stored {
            Ok(artifact) => {
                ctx.metrics.inc_artifacts_persisted();
                ctx.metrics.inc_steps_succeeded();
                obs::emit_step_succeeded(step.id, attempt, artifact.version);
                self.emit(
                    ctx,
                    LifecycleEvent::TaskCompleted {
                        task_id: step.id.to_string(),
                        result: value.clone(),
                    },
                );
                AttemptOutcome::Succeeded(value)
            }
            Err(source) => {
                let err = OrchestratorError::Storage {
                    step_id: step.id.to_string(),
                    source,
                };
                self.fail(ctx, step.id, &err);
                AttemptOutcome::Terminal(err)
            }
        }
    }

    fn fail(&self, ctx: &ExecutionContext, step_id: &str, err: &OrchestratorError) {
        ctx.metrics.inc_steps_failed();
        self.emit(
            ctx,
            LifecycleEvent::TaskFailed {
                task_id: step_id.to_string(),
                error: err.failure_message(),
            },
        );
    }

    fn emit(&self, ctx: &ExecutionContext, event: LifecycleEvent) {
        self.bus.emit_lifecycle(event, Some(&ctx.correlation_id));
    }
}
