//! Bounded-retry dead-letter queue.
//!
//! A failed event is retried against the queue's own handler list after
//! `100ms * 2^retry_count`. Handlers run in order; the first error aborts
//! the attempt and re-enqueues the whole event with `retry_count + 1`. Once
//! `retry_count >= max_retries` the event is parked in the failed list for
//! good. A queue without handlers has nothing to retry against and parks
//! every event as soon as it arrives. Exhaustion is logged, not raised: inspect it with
//! [`DeadLetterQueue::get_failed_events`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::events::envelope::Event;
use crate::events::handler::Handler;
use crate::metrics::RunMetrics;

/// Base retry delay; doubled for every previous retry.
pub const DEAD_LETTER_BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Default number of retries before an event is parked.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// An event that exhausted its retries.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEvent {
    pub event: Event,
    pub retry_count: u32,
}

pub struct DeadLetterQueue {
    max_retries: u32,
    handlers: RwLock<Vec<Handler>>,
    failed: Mutex<Vec<FailedEvent>>,
    in_flight: AtomicUsize,
    idle: Notify,
    metrics: Option<Arc<RunMetrics>>,
}

impl std::fmt::Debug for DeadLetterQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterQueue")
            .field("max_retries", &self.max_retries)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

/// Delay before retry number `retry_count + 1`.
pub fn retry_delay(retry_count: u32) -> Duration {
    DEAD_LETTER_BACKOFF_BASE.saturating_mul(2u32.saturating_pow(retry_count))
}

impl DeadLetterQueue {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            handlers: RwLock::new(Vec::new()),
            failed: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            metrics: None,
        }
    }

    /// Count parked events into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn add_handler(&self, handler: Handler) {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handler);
    }

    fn failed(&self) -> MutexGuard<'_, Vec<FailedEvent>> {
        self.failed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Schedule a retry for `event`, or park it if retries are exhausted.
    ///
    /// Must be called from within a tokio runtime when a retry is due.
    pub fn enqueue_failed(self: &Arc<Self>, event: Event, retry_count: u32) {
        if retry_count >= self.max_retries {
            self.park(event, retry_count, "dead-letter retries exhausted");
            return;
        }
        if self.handler_count() == 0 {
            self.park(event, retry_count, "no dead-letter handlers registered");
            return;
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.retry(event, retry_count).await;
            if queue.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                queue.idle.notify_waiters();
            }
        });
    }

    fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn park(&self, event: Event, retry_count: u32, reason: &str) {
        warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            retry_count,
            reason,
            "event parked in dead-letter queue"
        );
        if let Some(metrics) = &self.metrics {
            metrics.inc_dead_lettered();
        }
        self.failed().push(FailedEvent { event, retry_count });
    }

    async fn retry(self: &Arc<Self>, event: Event, retry_count: u32) {
        tokio::time::sleep(retry_delay(retry_count)).await;

        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let shared = Arc::new(event);
        for handler in &handlers {
            if let Err(e) = handler.invoke(&shared).await {
                debug!(event_id = %shared.id, retry_count, error = %e, "dead-letter retry failed");
                let event = Arc::try_unwrap(shared).unwrap_or_else(|arc| Event::clone(&arc));
                // Re-enqueue before this retry counts as finished so that
                // `wait_idle` never observes a gap.
                self.enqueue_failed(event, retry_count + 1);
                return;
            }
        }
        debug!(event_id = %shared.id, retry_count, "dead-letter retry succeeded");
    }

    /// Snapshot of parked `(event, retry_count)` entries.
    pub fn get_failed_events(&self) -> Vec<FailedEvent> {
        self.failed().clone()
    }

    pub fn clear_dlq(&self) {
        self.failed().clear();
    }

    /// Retries scheduled or running.
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no retry is scheduled or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn counting_handler(calls: &Arc<AtomicU32>, fail: bool) -> Handler {
        let calls = Arc::clone(calls);
        Handler::sync(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            if fail {
                anyhow::bail!("simulated failure");
            }
            Ok(())
        })
    }

    #[test]
    fn retry_delay_doubles() {
        assert_eq!(retry_delay(0), Duration::from_millis(100));
        assert_eq!(retry_delay(1), Duration::from_millis(200));
        assert_eq!(retry_delay(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn queue_without_handlers_parks_immediately() {
        let metrics = Arc::new(RunMetrics::new());
        let dlq = Arc::new(DeadLetterQueue::new(3).with_metrics(Arc::clone(&metrics)));

        dlq.enqueue_failed(Event::new("test.event", json!({})), 0);

        assert_eq!(dlq.pending(), 0);
        let parked = dlq.get_failed_events();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].retry_count, 0);
        assert_eq!(metrics.snapshot().dead_lettered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_retry_leaves_nothing_parked() {
        let dlq = Arc::new(DeadLetterQueue::new(2));
        let calls = Arc::new(AtomicU32::new(0));
        dlq.add_handler(counting_handler(&calls, false));

        dlq.enqueue_failed(Event::new("test.event", json!({"test": true})), 0);
        assert_eq!(dlq.pending(), 1);
        dlq.wait_idle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(dlq.get_failed_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_event_is_parked_after_max_retries() {
        let metrics = Arc::new(RunMetrics::new());
        let dlq = Arc::new(DeadLetterQueue::new(3).with_metrics(Arc::clone(&metrics)));
        let calls = Arc::new(AtomicU32::new(0));
        dlq.add_handler(counting_handler(&calls, true));

        let started = tokio::time::Instant::now();
        let event = Event::new("test.event", json!({"test": true}));
        dlq.enqueue_failed(event.clone(), 0);
        dlq.wait_idle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let failed = dlq.get_failed_events();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].retry_count, 3);
        assert_eq!(failed[0].event, event);
        // 100 + 200 + 400 ms of backoff.
        assert!(started.elapsed() >= Duration::from_millis(700));
        assert_eq!(metrics.snapshot().dead_lettered, 1);
    }

    #[tokio::test]
    async fn exhausted_on_arrival_is_parked_immediately() {
        let dlq = Arc::new(DeadLetterQueue::new(1));
        dlq.enqueue_failed(Event::new("test.event", json!(null)), 1);
        assert_eq!(dlq.pending(), 0);
        assert_eq!(dlq.get_failed_events().len(), 1);

        dlq.clear_dlq();
        assert!(dlq.get_failed_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_failing_handler_stops_the_attempt() {
        let dlq = Arc::new(DeadLetterQueue::new(1));
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        dlq.add_handler(counting_handler(&first, true));
        dlq.add_handler(counting_handler(&second, false));

        dlq.enqueue_failed(Event::new("x", json!(null)), 0);
        dlq.wait_idle().await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(dlq.get_failed_events()[0].retry_count, 1);
    }
}
