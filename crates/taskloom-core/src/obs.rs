//! Structured log records for plan and step lifecycle.
//!
//! These are operator-facing `tracing` records, distinct from the
//! [`crate::events`] envelopes delivered to subscribers. Every record carries
//! an `event` field so log pipelines can filter on it.

use std::time::Instant;

use tracing::{info, warn};

/// RAII guard around one plan execution.
///
/// Logs `plan.started` on creation. Call [`PlanSpan::finish`] with the
/// outcome; a guard dropped without finishing logs `plan.aborted` (e.g. the
/// future was cancelled). The guard is `Send` and may be held across awaits;
/// span context comes from the caller's `#[instrument]`.
pub struct PlanSpan {
    plan_id: String,
    started: Instant,
    finished: bool,
}

impl PlanSpan {
    pub fn enter(plan_id: &str, correlation_id: &str, steps: usize) -> Self {
        info!(
            event = "plan.started",
            plan_id = %plan_id,
            correlation_id = %correlation_id,
            steps
        );
        Self {
            plan_id: plan_id.to_string(),
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn finish(mut self, success: bool) {
        self.finished = true;
        info!(
            event = "plan.finished",
            plan_id = %self.plan_id,
            duration_ms = self.started.elapsed().as_millis() as u64,
            success,
        );
    }
}

impl Drop for PlanSpan {
    fn drop(&mut self) {
        if !self.finished {
            warn!(event = "plan.aborted", plan_id = %self.plan_id);
        }
    }
}

pub fn emit_step_started(step_id: &str, attempt: u32) {
    info!(event = "step.started", step_id = %step_id, attempt);
}

pub fn emit_step_succeeded(step_id: &str, attempt: u32, version: u32) {
    info!(event = "step.succeeded", step_id = %step_id, attempt, artifact_version = version);
}

/// Attempt failed and another one is scheduled after `delay_ms`.
pub fn emit_step_retry(step_id: &str, attempt: u32, delay_ms: u64, error: &dyn std::fmt::Display) {
    warn!(event = "step.retry", step_id = %step_id, attempt, delay_ms, error = %error);
}

pub fn emit_step_failed(step_id: &str, attempts: u32, error: &dyn std::fmt::Display) {
    warn!(event = "step.failed", step_id = %step_id, attempts, error = %error);
}

pub fn emit_escalation(step_id: &str, reason: &str) {
    warn!(event = "step.escalated", step_id = %step_id, reason = %reason);
}

pub fn emit_items_cancelled(failed: &str, cancelled: usize) {
    warn!(event = "dag.cancelled", failed_item = %failed, cancelled);
}
