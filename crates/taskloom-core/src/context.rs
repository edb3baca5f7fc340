//! Plan-scoped execution context.
//!
//! Everything an executor needs to know about "the current run" travels in an
//! [`ExecutionContext`] passed by reference: the plan namespace, the
//! correlation id stamped on every emitted event, the memory scope results
//! are persisted under, and the run's metrics.

use std::sync::Arc;

use taskloom_state::ArtifactScope;

use crate::metrics::RunMetrics;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub plan_id: String,
    pub correlation_id: String,
    pub scope: ArtifactScope,
    pub metrics: Arc<RunMetrics>,
}

impl ExecutionContext {
    /// Context with a fresh UUID v4 correlation id and the default scope.
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
            scope: ArtifactScope::default(),
            metrics: Arc::new(RunMetrics::new()),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_scope(mut self, scope: ArtifactScope) -> Self {
        self.scope = scope;
        self
    }

    /// Share metrics with another context (e.g. a parent run).
    pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_distinct_correlation_ids() {
        let a = ExecutionContext::new("plan");
        let b = ExecutionContext::new("plan");
        assert_ne!(a.correlation_id, b.correlation_id);
        assert!(uuid::Uuid::parse_str(&a.correlation_id).is_ok());
        assert_eq!(a.scope, ArtifactScope::default());
    }

    #[test]
    fn builders_override_fields() {
        let metrics = Arc::new(RunMetrics::new());
        let ctx = ExecutionContext::new("plan")
            .with_correlation_id("corr-1")
            .with_scope(ArtifactScope::new("acme", "web"))
            .with_metrics(Arc::clone(&metrics));
        assert_eq!(ctx.correlation_id, "corr-1");
        assert_eq!(ctx.scope.tenant_id, "acme");
        ctx.metrics.inc_retries();
        assert_eq!(metrics.snapshot().retries, 1);
    }
}
