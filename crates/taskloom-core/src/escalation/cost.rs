//! Spend ledger with a budget alert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One recorded expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub timestamp: DateTime<Utc>,
    pub amount: f64,
    pub description: String,
    /// Free-form; `metadata.type` is used by [`CostTracker::costs_by_type`].
    pub metadata: serde_json::Value,
}

type AlertFn = Box<dyn Fn(f64) + Send + Sync>;

/// Accumulates costs and fires an alert the first time spend reaches
/// `budget_limit * alert_threshold`.
pub struct CostTracker {
    budget_limit: f64,
    alert_threshold: f64,
    current_cost: f64,
    costs: Vec<CostEntry>,
    alert: Option<AlertFn>,
    alerted: bool,
}

impl std::fmt::Debug for CostTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostTracker")
            .field("budget_limit", &self.budget_limit)
            .field("alert_threshold", &self.alert_threshold)
            .field("current_cost", &self.current_cost)
            .field("entries", &self.costs.len())
            .finish()
    }
}

impl CostTracker {
    pub fn new(budget_limit: f64, alert_threshold: f64) -> Self {
        Self {
            budget_limit,
            alert_threshold,
            current_cost: 0.0,
            costs: Vec::new(),
            alert: None,
            alerted: false,
        }
    }

    /// Called with the cumulative spend when the alert threshold is reached.
    pub fn set_alert_callback<F>(&mut self, callback: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.alert = Some(Box::new(callback));
    }

    pub fn add_cost(&mut self, amount: f64, description: &str, metadata: serde_json::Value) {
        self.current_cost += amount;
        self.costs.push(CostEntry {
            timestamp: Utc::now(),
            amount,
            description: description.to_string(),
            metadata,
        });
        self.check_alert();
    }

    fn check_alert(&mut self) {
        if self.alerted || self.current_cost < self.budget_limit * self.alert_threshold {
            return;
        }
        self.alerted = true;
        warn!(
            spent = self.current_cost,
            budget_limit = self.budget_limit,
            "cost alert threshold reached"
        );
        if let Some(alert) = &self.alert {
            alert(self.current_cost);
        }
    }

    pub fn total(&self) -> f64 {
        self.current_cost
    }

    /// Budget left, negative once overspent.
    pub fn remaining(&self) -> f64 {
        self.budget_limit - self.current_cost
    }

    pub fn entries(&self) -> &[CostEntry] {
        &self.costs
    }

    pub fn costs_by_type(&self, cost_type: &str) -> Vec<&CostEntry> {
        self.costs
            .iter()
            .filter(|c| c.metadata.get("type").and_then(|t| t.as_str()) == Some(cost_type))
            .collect()
    }

    /// Forget all entries and re-arm the alert.
    pub fn reset(&mut self) {
        self.current_cost = 0.0;
        self.costs.clear();
        self.alerted = false;
    }
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new(100.0, 0.8)
    }
}
