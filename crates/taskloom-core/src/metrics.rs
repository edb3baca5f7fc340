//! Per-run atomic counters.
//!
//! A [`RunMetrics`] is owned by an [`crate::context::ExecutionContext`] and
//! shared by `Arc` with everything that runs under it. There is no
//! process-wide instance: two plans executing side by side never see each
//! other's counts. Call [`RunMetrics::flush`] to emit the current values as a
//! single `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lightweight atomic counters, no allocations, no locking.
#[derive(Debug, Default)]
pub struct RunMetrics {
    events_emitted: AtomicU64,
    events_delivered: AtomicU64,
    handler_failures: AtomicU64,
    dead_lettered: AtomicU64,
    steps_started: AtomicU64,
    steps_succeeded: AtomicU64,
    steps_failed: AtomicU64,
    retries: AtomicU64,
    escalations: AtomicU64,
    artifacts_persisted: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub events_emitted: u64,
    pub events_delivered: u64,
    pub handler_failures: u64,
    pub dead_lettered: u64,
    pub steps_started: u64,
    pub steps_succeeded: u64,
    pub steps_failed: u64,
    pub retries: u64,
    pub escalations: u64,
    pub artifacts_persisted: u64,
}

fn bump(counter: &AtomicU64, metric: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(metric, "counter incremented");
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_events_emitted(&self) {
        bump(&self.events_emitted, "events_emitted");
    }

    /// One handler invocation that returned successfully.
    pub fn inc_events_delivered(&self) {
        bump(&self.events_delivered, "events_delivered");
    }

    pub fn inc_handler_failures(&self) {
        bump(&self.handler_failures, "handler_failures");
    }

    /// An event that exhausted its dead-letter retries.
    pub fn inc_dead_lettered(&self) {
        bump(&self.dead_lettered, "dead_lettered");
    }

    /// One attempt of a step or parallel item started.
    pub fn inc_steps_started(&self) {
        bump(&self.steps_started, "steps_started");
    }

    pub fn inc_steps_succeeded(&self) {
        bump(&self.steps_succeeded, "steps_succeeded");
    }

    pub fn inc_steps_failed(&self) {
        bump(&self.steps_failed, "steps_failed");
    }

    pub fn inc_retries(&self) {
        bump(&self.retries, "retries");
    }

    pub fn inc_escalations(&self) {
        bump(&self.escalations, "escalations");
    }

    pub fn inc_artifacts_persisted(&self) {
        bump(&self.artifacts_persisted, "artifacts_persisted");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            events_emitted: load(&self.events_emitted),
            events_delivered: load(&self.events_delivered),
            handler_failures: load(&self.handler_failures),
            dead_lettered: load(&self.dead_lettered),
            steps_started: load(&self.steps_started),
            steps_succeeded: load(&self.steps_succeeded),
            steps_failed: load(&self.steps_failed),
            retries: load(&self.retries),
            escalations: load(&self.escalations),
            artifacts_persisted: load(&self.artifacts_persisted),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call at natural boundaries (end of a plan) rather than per increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            events_emitted = s.events_emitted,
            events_delivered = s.events_delivered,
            handler_failures = s.handler_failures,
            dead_lettered = s.dead_lettered,
            steps_started = s.steps_started,
            steps_succeeded = s.steps_succeeded,
            steps_failed = s.steps_failed,
            retries = s.retries,
            escalations = s.escalations,
            artifacts_persisted = s.artifacts_persisted,
        );
    }

    pub fn reset(&self) {
        for counter in [
            &self.events_emitted,
            &self.events_delivered,
            &self.handler_failures,
            &self.dead_lettered,
            &self.steps_started,
            &self.steps_succeeded,
            &self.steps_failed,
            &self.retries,
            &self.escalations,
            &self.artifacts_persisted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = RunMetrics::new();
        m.inc_steps_started();
        m.inc_steps_started();
        m.inc_retries();
        m.inc_escalations();

        let s = m.snapshot();
        assert_eq!(s.steps_started, 2);
        assert_eq!(s.retries, 1);
        assert_eq!(s.escalations, 1);
        assert_eq!(s.steps_failed, 0);
    }

    #[test]
    fn instances_are_independent() {
        let a = RunMetrics::new();
        let b = RunMetrics::new();
        a.inc_events_emitted();
        assert_eq!(a.snapshot().events_emitted, 1);
        assert_eq!(b.snapshot().events_emitted, 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = RunMetrics::new();
        m.inc_events_delivered();
        m.inc_dead_lettered();
        m.inc_artifacts_persisted();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
