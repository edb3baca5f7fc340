//! Event envelope and the typed lifecycle variants carried inside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emitted by the orchestrator as the `agent_id` of `task.started`.
pub const ORCHESTRATOR_AGENT: &str = "orchestrator";

/// Immutable record delivered to subscribers.
///
/// Also the line format of the durable log:
/// `{type, data, id, timestamp, correlation_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Dot-delimited type, e.g. `task.started`.
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl Event {
    /// New event with a fresh UUID v4 id, stamped now.
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Task lifecycle notifications published by the executors.
///
/// Serialized adjacently tagged so that `type` and `data` line up with the
/// [`Event`] envelope fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LifecycleEvent {
    #[serde(rename = "task.started")]
    TaskStarted { task_id: String, agent_id: String },

    #[serde(rename = "task.completed")]
    TaskCompleted {
        task_id: String,
        result: serde_json::Value,
    },

    #[serde(rename = "task.failed")]
    TaskFailed { task_id: String, error: String },

    #[serde(rename = "escalation.needed")]
    EscalationNeeded { task_id: String, reason: String },
}

impl LifecycleEvent {
    pub const TASK_STARTED: &'static str = "task.started";
    pub const TASK_COMPLETED: &'static str = "task.completed";
    pub const TASK_FAILED: &'static str = "task.failed";
    pub const ESCALATION_NEEDED: &'static str = "escalation.needed";

    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::TaskStarted { .. } => Self::TASK_STARTED,
            LifecycleEvent::TaskCompleted { .. } => Self::TASK_COMPLETED,
            LifecycleEvent::TaskFailed { .. } => Self::TASK_FAILED,
            LifecycleEvent::EscalationNeeded { .. } => Self::ESCALATION_NEEDED,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            LifecycleEvent::TaskStarted { task_id, .. }
            | LifecycleEvent::TaskCompleted { task_id, .. }
            | LifecycleEvent::TaskFailed { task_id, .. }
            | LifecycleEvent::EscalationNeeded { task_id, .. } => task_id,
        }
    }

    /// Wrap into an envelope, stamping `correlation_id`.
    pub fn into_event(self, correlation_id: Option<&str>) -> Event {
        let event_type = self.event_type();
        let data = match serde_json::to_value(&self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("data").unwrap_or(serde_json::Value::Null)
            }
            _ => serde_json::Value::Null,
        };
        let event = Event::new(event_type, data);
        match correlation_id {
            Some(id) => event.with_correlation_id(id),
            None => event,
        }
    }

    /// Recover the typed variant from an envelope; `None` for other event types
    /// or payloads of the wrong shape.
    pub fn parse(event: &Event) -> Option<Self> {
        serde_json::from_value(serde_json::json!({
            "type": event.event_type,
            "data": event.data,
        }))
        .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_serializes_type_field() {
        let event = Event::new("task.started", json!({"x": 1})).with_correlation_id("c1");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "task.started");
        assert_eq!(value["correlation_id"], "c1");
        assert!(value["timestamp"].is_string());
        assert!(uuid::Uuid::parse_str(value["id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn events_get_unique_ids() {
        let a = Event::new("x", json!(null));
        let b = Event::new("x", json!(null));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn lifecycle_into_event_puts_fields_in_data() {
        let event = LifecycleEvent::TaskFailed {
            task_id: "t1".into(),
            error: "boom".into(),
        }
        .into_event(Some("corr"));
        assert_eq!(event.event_type, "task.failed");
        assert_eq!(event.data, json!({"task_id": "t1", "error": "boom"}));
        assert_eq!(event.correlation_id.as_deref(), Some("corr"));
    }

    #[test]
    fn lifecycle_parse_recovers_variant() {
        let original = LifecycleEvent::TaskCompleted {
            task_id: "t".into(),
            result: json!({"n": [1, 2]}),
        };
        let event = original.clone().into_event(None);
        assert_eq!(LifecycleEvent::parse(&event), Some(original));
    }

    #[test]
    fn parse_ignores_unrelated_events() {
        let event = Event::new("audit.recorded", json!({"task_id": "t"}));
        assert_eq!(LifecycleEvent::parse(&event), None);
    }

    #[test]
    fn escalation_type_string() {
        let e = LifecycleEvent::EscalationNeeded {
            task_id: "t".into(),
            reason: "r".into(),
        };
        assert_eq!(e.event_type(), "escalation.needed");
        assert_eq!(e.task_id(), "t");
    }
}
