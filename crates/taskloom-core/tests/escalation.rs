//! Escalation policy driven by orchestrator escalation events.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskloom_core::escalation::{CostTracker, EscalationError, EscalationPolicy};
use taskloom_core::events::{Event, EventBus, Handler, LifecycleEvent};
use taskloom_core::orchestrator::{ExecutionOrchestrator, PlanStep, StepOptions, WorkItem};
use taskloom_core::{ExecutionContext, RuntimeConfig};
use taskloom_state::MemoryProjectMemory;

fn chain() -> Vec<String> {
    ["a", "b", "c"].iter().map(|s| s.to_string()).collect()
}

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().map(|s| Duration::from_secs(*s)).collect()
}

#[test]
fn chain_and_backoff_saturate() {
    let policy = EscalationPolicy::new(chain(), secs(&[1, 2]), 100.0).unwrap();

    assert_eq!(policy.escalate(0), "b");
    assert_eq!(policy.escalate(1), "c");
    assert_eq!(policy.escalate(2), "c");
    assert!(policy.is_at_end(2));
    assert!(!policy.is_at_end(1));

    assert_eq!(policy.get_backoff(1), Duration::from_secs(1));
    assert_eq!(policy.get_backoff(2), Duration::from_secs(2));
    assert_eq!(policy.get_backoff(3), Duration::from_secs(2));
}

#[test]
fn invalid_policies_are_rejected() {
    assert_eq!(
        EscalationPolicy::new(vec![], secs(&[1]), 1.0).unwrap_err(),
        EscalationError::EmptyChain
    );
    assert_eq!(
        EscalationPolicy::new(chain(), vec![], 1.0).unwrap_err(),
        EscalationError::EmptyBackoff
    );
}

#[test]
fn budget_from_config_feeds_cost_alerts() {
    let config = RuntimeConfig {
        escalation_budget: 10.0,
        cost_alert_threshold: 0.5,
        ..RuntimeConfig::default()
    };
    let mut policy = EscalationPolicy::from_config(chain(), secs(&[1]), &config).unwrap();

    assert!(policy.can_afford(10.0));
    policy.track_cost(6.0);
    assert!(!policy.can_afford(5.0));
    assert!(policy.can_afford(4.0));
    assert_eq!(policy.current_cost(), 6.0);

    let tracker = policy.cost_tracker().unwrap();
    assert_eq!(tracker.total(), 6.0);
    assert_eq!(tracker.costs_by_type("escalation").len(), 1);
}

#[test]
fn alert_fires_once_per_reset() {
    let fired = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&fired);
    let mut tracker = CostTracker::new(10.0, 0.8);
    tracker.set_alert_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    tracker.add_cost(5.0, "model call", serde_json::json!({"type": "llm"}));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    tracker.add_cost(4.0, "model call", serde_json::json!({"type": "llm"}));
    tracker.add_cost(4.0, "model call", serde_json::json!({"type": "llm"}));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(tracker.remaining() < 0.0);

    tracker.reset();
    tracker.add_cost(9.0, "model call", serde_json::json!({"type": "llm"}));
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn escalation_events_walk_the_chain() {
    let bus = Arc::new(EventBus::new());
    let reasons: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
    let sink = Arc::clone(&reasons);
    bus.subscribe(
        "escalation.*",
        Handler::from_fn(move |event: Event| {
            let sink = Arc::clone(&sink);
            async move {
                if let Some(LifecycleEvent::EscalationNeeded { task_id, reason }) =
                    LifecycleEvent::parse(&event)
                {
                    sink.lock().unwrap().push((task_id, reason));
                }
                Ok(())
            }
        }),
    )
    .await
    .unwrap();
    bus.start();

    let orchestrator =
        ExecutionOrchestrator::new(Arc::clone(&bus), Arc::new(MemoryProjectMemory::new()));
    let mut policy = EscalationPolicy::new(chain(), secs(&[1, 2]), 3.0).unwrap();
    let ctx = ExecutionContext::new("escalating");
    let options = StepOptions::default().escalate_on_failure(true);

    // Each tier fails until the last one, which succeeds.
    let mut level = 0;
    let mut target = policy.chain()[0].clone();
    let begin = tokio::time::Instant::now();
    let result = loop {
        let tier = target.clone();
        let work = WorkItem::suspending(move || {
            let tier = tier.clone();
            async move {
                if tier != "c" {
                    anyhow::bail!("{tier} could not handle it");
                }
                Ok(serde_json::json!({ "handled_by": tier }))
            }
        });
        let steps = vec![PlanStep::new("triage", work).with_options(options.clone())];
        match orchestrator.execute_plan(&ctx, &steps).await {
            Ok(mut results) => break results.remove(0),
            Err(_) => {
                assert!(policy.can_afford(1.0));
                policy.track_cost(1.0);
                policy.wait_backoff(level + 1).await;
                target = policy.escalate(level).to_string();
                level += 1;
            }
        }
    };
    bus.flush().await;

    assert_eq!(result["handled_by"], "c");
    assert_eq!(policy.current_cost(), 2.0);
    assert!(policy.can_afford(1.0));
    assert!(!policy.can_afford(1.5));
    assert!(begin.elapsed() >= Duration::from_secs(3));
    assert_eq!(
        *reasons.lock().unwrap(),
        vec![
            ("triage".to_string(), "a could not handle it".to_string()),
            ("triage".to_string(), "b could not handle it".to_string()),
        ]
    );
}
