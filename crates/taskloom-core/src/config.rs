//! Runtime configuration.
//!
//! Values come from defaults, `TASKLOOM_*` environment variables, or a TOML
//! document. Unset or unparsable environment values fall back to defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::orchestrator::step::RetryBackoff;

/// Tunables shared by the executors and the event fabric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Admission limit for the parallel executor.
    pub max_workers: usize,
    /// Per-item timeout for the parallel executor; none waits forever.
    pub item_timeout_ms: Option<u64>,
    pub dead_letter_max_retries: u32,
    /// Defaults applied to steps that do not set their own options.
    pub default_retries: u32,
    pub default_backoff_base_ms: u64,
    pub default_retry_backoff: RetryBackoff,
    pub escalation_budget: f64,
    /// Fraction of the budget at which the cost alert fires.
    pub cost_alert_threshold: f64,
    /// Durable event log; none disables logging to disk.
    pub event_log_path: Option<PathBuf>,
    pub log_json: bool,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            item_timeout_ms: None,
            dead_letter_max_retries: 3,
            default_retries: 0,
            default_backoff_base_ms: 50,
            default_retry_backoff: RetryBackoff::Fixed,
            escalation_budget: 100.0,
            cost_alert_threshold: 0.8,
            event_log_path: None,
            log_json: false,
            log_level: "info".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl RuntimeConfig {
    /// Load from `TASKLOOM_*` environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `TASKLOOM_MAX_WORKERS` | `max_workers` |
    /// | `TASKLOOM_ITEM_TIMEOUT_MS` | `item_timeout_ms` |
    /// | `TASKLOOM_DLQ_MAX_RETRIES` | `dead_letter_max_retries` |
    /// | `TASKLOOM_RETRIES` | `default_retries` |
    /// | `TASKLOOM_BACKOFF_BASE_MS` | `default_backoff_base_ms` |
    /// | `TASKLOOM_RETRY_BACKOFF` | `default_retry_backoff` (`fixed`/`exponential`) |
    /// | `TASKLOOM_ESCALATION_BUDGET` | `escalation_budget` |
    /// | `TASKLOOM_COST_ALERT_THRESHOLD` | `cost_alert_threshold` |
    /// | `TASKLOOM_EVENT_LOG` | `event_log_path` |
    /// | `TASKLOOM_LOG_FORMAT` | `log_json` when `json` |
    /// | `TASKLOOM_LOG_LEVEL` | `log_level` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_workers: env_parse("TASKLOOM_MAX_WORKERS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_workers),
            item_timeout_ms: env_parse("TASKLOOM_ITEM_TIMEOUT_MS").or(defaults.item_timeout_ms),
            dead_letter_max_retries: env_parse("TASKLOOM_DLQ_MAX_RETRIES")
                .unwrap_or(defaults.dead_letter_max_retries),
            default_retries: env_parse("TASKLOOM_RETRIES").unwrap_or(defaults.default_retries),
            default_backoff_base_ms: env_parse("TASKLOOM_BACKOFF_BASE_MS")
                .unwrap_or(defaults.default_backoff_base_ms),
            default_retry_backoff: std::env::var("TASKLOOM_RETRY_BACKOFF")
                .ok()
                .and_then(|v| RetryBackoff::parse(&v))
                .unwrap_or(defaults.default_retry_backoff),
            escalation_budget: env_parse("TASKLOOM_ESCALATION_BUDGET")
                .unwrap_or(defaults.escalation_budget),
            cost_alert_threshold: env_parse("TASKLOOM_COST_ALERT_THRESHOLD")
                .unwrap_or(defaults.cost_alert_threshold),
            event_log_path: std::env::var("TASKLOOM_EVENT_LOG")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .or(defaults.event_log_path),
            log_json: std::env::var("TASKLOOM_LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.log_json),
            log_level: std::env::var("TASKLOOM_LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout_ms.map(Duration::from_millis)
    }

    pub fn default_backoff_base(&self) -> Duration {
        Duration::from_millis(self.default_backoff_base_ms)
    }

    /// `log_level` as a tracing level, `INFO` when unrecognised.
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_runtime_contract() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.dead_letter_max_retries, 3);
        assert_eq!(config.default_retries, 0);
        assert_eq!(config.default_backoff_base(), Duration::from_millis(50));
        assert_eq!(config.default_retry_backoff, RetryBackoff::Fixed);
        assert_eq!(config.escalation_budget, 100.0);
        assert!(config.item_timeout().is_none());
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            max_workers = 4
            item_timeout_ms = 2500
            default_retry_backoff = "exponential"
            event_log_path = "/var/log/taskloom/events.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.item_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.default_retry_backoff, RetryBackoff::Exponential);
        assert_eq!(
            config.event_log_path.as_deref(),
            Some(std::path::Path::new("/var/log/taskloom/events.jsonl"))
        );
        assert_eq!(config.dead_letter_max_retries, 3);
    }

    #[test]
    fn from_env_reads_and_falls_back() {
        std::env::set_var("TASKLOOM_MAX_WORKERS", "3");
        std::env::set_var("TASKLOOM_RETRY_BACKOFF", "exponential");
        std::env::set_var("TASKLOOM_DLQ_MAX_RETRIES", "not-a-number");
        let config = RuntimeConfig::from_env();
        std::env::remove_var("TASKLOOM_MAX_WORKERS");
        std::env::remove_var("TASKLOOM_RETRY_BACKOFF");
        std::env::remove_var("TASKLOOM_DLQ_MAX_RETRIES");

        assert_eq!(config.max_workers, 3);
        assert_eq!(config.default_retry_backoff, RetryBackoff::Exponential);
        assert_eq!(config.dead_letter_max_retries, 3);
    }

    #[test]
    fn toml_rejects_wrong_types() {
        assert!(RuntimeConfig::from_toml_str("max_workers = \"many\"").is_err());
    }

    #[test]
    fn tracing_level_falls_back_to_info() {
        let config = RuntimeConfig {
            log_level: "chatty".to_string(),
            ..RuntimeConfig::default()
        };
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }
}
