//! Plan steps and their retry options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::orchestrator::work::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Wait `backoff_base` between every attempt.
    #[default]
    Fixed,
    /// Wait `backoff_base * 2^attempt`, with `attempt` counted from 0.
    Exponential,
}

impl RetryBackoff {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(RetryBackoff::Fixed),
            "exponential" => Some(RetryBackoff::Exponential),
            _ => None,
        }
    }
}

/// Durations as integer milliseconds on the wire.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => s.serialize_some(&(d.as_millis() as u64)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
        }
    }
}

/// Per-step retry, timeout and escalation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepOptions {
    /// Extra attempts after the first; total attempts = `retries + 1`.
    pub retries: u32,
    /// Bound on each attempt; `None` waits indefinitely.
    #[serde(rename = "timeout_ms", with = "millis::option")]
    pub timeout: Option<Duration>,
    pub retry_backoff: RetryBackoff,
    #[serde(rename = "backoff_base_ms", with = "millis")]
    pub backoff_base: Duration,
    /// Emit `escalation.needed` before reporting a terminal failure.
    pub escalate_on_failure: bool,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            retries: 0,
            timeout: None,
            retry_backoff: RetryBackoff::Fixed,
            backoff_base: Duration::from_millis(50),
            escalate_on_failure: false,
        }
    }
}

impl StepOptions {
    /// Defaults taken from `config` instead of the built-in values.
    pub fn default_from(config: &RuntimeConfig) -> Self {
        Self {
            retries: config.default_retries,
            retry_backoff: config.default_retry_backoff,
            backoff_base: config.default_backoff_base(),
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_backoff(mut self, retry_backoff: RetryBackoff, base: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self.backoff_base = base;
        self
    }

    pub fn escalate_on_failure(mut self, escalate: bool) -> Self {
        self.escalate_on_failure = escalate;
        self
    }

    /// Delay after failed 0-based `attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        match self.retry_backoff {
            RetryBackoff::Fixed => self.backoff_base,
            RetryBackoff::Exponential => self
                .backoff_base
                .saturating_mul(2u32.saturating_pow(attempt)),
        }
    }
}

/// One entry of an ordered plan.
///
/// `work` is usually set in code; steps loaded from JSON or TOML name an
/// `agent` instead and are resolved through a
/// [`crate::orchestrator::RegistryResolver`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip)]
    pub work: Option<WorkItem>,
    #[serde(default)]
    pub options: StepOptions,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, work: WorkItem) -> Self {
        Self {
            id: Some(id.into()),
            work: Some(work),
            ..Self::default()
        }
    }

    /// Step whose work is looked up by agent name.
    pub fn for_agent(id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            agent: Some(agent.into()),
            ..Self::default()
        }
    }

    /// Anonymous step; its id becomes `step_<index>`.
    pub fn anonymous(work: WorkItem) -> Self {
        Self {
            work: Some(work),
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    /// Explicit id, or `step_<index>` for position `index` in the plan.
    pub fn resolved_id(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("step_{index}"))
    }
}
