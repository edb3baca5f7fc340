//! Escalation policy.
//!
//! The chain is an ordered list of increasingly capable (and costly) targets
//! whose last entry is absorbing: escalating past the end stays there.
//! Backoff is looked up per 1-based attempt, repeating the final entry once
//! the schedule runs out. The only suspension point is
//! [`EscalationPolicy::wait_backoff`].

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::escalation::cost::CostTracker;
use crate::escalation::error::{EscalationError, EscalationResult};

pub const DEFAULT_BUDGET: f64 = 100.0;

#[derive(Debug)]
pub struct EscalationPolicy {
    chain: Vec<String>,
    backoff: Vec<Duration>,
    budget: f64,
    current_cost: f64,
    tracker: Option<CostTracker>,
}

impl EscalationPolicy {
    pub fn new(
        chain: Vec<String>,
        backoff: Vec<Duration>,
        budget: f64,
    ) -> EscalationResult<Self> {
        if chain.is_empty() {
            return Err(EscalationError::EmptyChain);
        }
        if backoff.is_empty() {
            return Err(EscalationError::EmptyBackoff);
        }
        if !budget.is_finite() {
            return Err(EscalationError::InvalidBudget(budget));
        }
        Ok(Self {
            chain,
            backoff,
            budget,
            current_cost: 0.0,
            tracker: None,
        })
    }

    /// Budget from `escalation_budget`, with a [`CostTracker`] alerting at
    /// `cost_alert_threshold`.
    pub fn from_config(
        chain: Vec<String>,
        backoff: Vec<Duration>,
        config: &RuntimeConfig,
    ) -> EscalationResult<Self> {
        let tracker = CostTracker::new(config.escalation_budget, config.cost_alert_threshold);
        Ok(Self::new(chain, backoff, config.escalation_budget)?.with_cost_tracker(tracker))
    }

    /// Record every tracked cost in `tracker` as well.
    pub fn with_cost_tracker(mut self, tracker: CostTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Target after `level`; the last target once the chain is exhausted.
    pub fn escalate(&self, level: usize) -> &str {
        let next = level.saturating_add(1).min(self.chain.len() - 1);
        &self.chain[next]
    }

    /// Backoff before 1-based `attempt`. Attempts past the schedule reuse
    /// the last entry; attempt 0 is treated as attempt 1.
    pub fn get_backoff(&self, attempt: usize) -> Duration {
        let idx = attempt.saturating_sub(1).min(self.backoff.len() - 1);
        self.backoff[idx]
    }

    /// Add `cost` to cumulative spend and deduct it from the remaining budget.
    pub fn track_cost(&mut self, cost: f64) {
        self.current_cost += cost;
        self.budget -= cost;
        debug!(cost, remaining = self.budget, "escalation cost tracked");
        if let Some(tracker) = &mut self.tracker {
            tracker.add_cost(cost, "escalation", json!({ "type": "escalation" }));
        }
    }

    /// Whether the budget left after previous deductions covers `cost`.
    pub fn can_afford(&self, cost: f64) -> bool {
        self.budget >= cost
    }

    pub fn is_at_end(&self, level: usize) -> bool {
        level >= self.chain.len() - 1
    }

    /// Remaining budget.
    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn current_cost(&self) -> f64 {
        self.current_cost
    }

    pub fn cost_tracker(&self) -> Option<&CostTracker> {
        self.tracker.as_ref()
    }

    /// Sleep for [`EscalationPolicy::get_backoff`]`(attempt)`.
    pub async fn wait_backoff(&self, attempt: usize) {
        tokio::time::sleep(self.get_backoff(attempt)).await;
    }
}
