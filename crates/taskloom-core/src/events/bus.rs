//! In-process publish/subscribe bus with a single FIFO dispatcher.
//!
//! # Delivery model
//!
//! [`EventBus::emit`] only enqueues onto an unbounded channel and never
//! blocks. One dispatcher task drains the channel. For each event it walks
//! subscription patterns in the order they were first registered and, for
//! every pattern that matches the event type, awaits each of that pattern's
//! handlers in registration order before moving on.
//!
//! Delivery is therefore strictly serialized: every subscriber sees events
//! in global emission order, and a slow handler delays every later event
//! for every subscriber. Throughput is bounded by the slowest handler times
//! the event rate. Handlers that need concurrency should hand work off to
//! their own task and return quickly.
//!
//! Handler errors (and panics) are logged per handler and never stop the
//! dispatcher or prevent delivery to the remaining handlers. When a
//! [`DeadLetterQueue`] is attached, each failed delivery also hands the event
//! to it for bounded retry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::events::dead_letter::DeadLetterQueue;
use crate::events::envelope::{Event, LifecycleEvent};
use crate::events::error::{EventError, EventResult};
use crate::events::handler::Handler;
use crate::events::log::EventLog;
use crate::metrics::RunMetrics;

struct Subscription {
    pattern: String,
    matcher: glob::Pattern,
    handlers: Vec<Handler>,
}

/// Shared between the bus handle and its dispatcher task.
struct Shared {
    subscriptions: RwLock<Vec<Subscription>>,
    receiver: Mutex<mpsc::UnboundedReceiver<Arc<Event>>>,
    /// Emitted but not yet fully dispatched.
    pending: AtomicUsize,
    idle: Notify,
    metrics: Arc<RunMetrics>,
    log: Option<Arc<EventLog>>,
    dead_letter: Option<Arc<DeadLetterQueue>>,
}

/// Optional collaborators wired into a bus at construction.
#[derive(Default)]
pub struct BusOptions {
    pub metrics: Option<Arc<RunMetrics>>,
    /// Every dispatched event is appended here before delivery.
    pub log: Option<Arc<EventLog>>,
    /// Receives events whose delivery failed.
    pub dead_letter: Option<Arc<DeadLetterQueue>>,
}

impl BusOptions {
    /// Options described by `config`: an [`EventLog`] at `event_log_path`
    /// when one is set, and a dead-letter queue bounded by
    /// `dead_letter_max_retries`.
    ///
    /// The queue starts without handlers, so failed deliveries are parked
    /// for [`DeadLetterQueue::get_failed_events`] right away. Register retry
    /// targets with [`DeadLetterQueue::add_handler`] to retry them instead.
    pub async fn from_config(
        config: &RuntimeConfig,
        metrics: Arc<RunMetrics>,
    ) -> EventResult<Self> {
        let log = match &config.event_log_path {
            Some(path) => Some(Arc::new(EventLog::open(path).await?)),
            None => None,
        };
        let dead_letter = DeadLetterQueue::new(config.dead_letter_max_retries)
            .with_metrics(Arc::clone(&metrics));
        Ok(Self {
            metrics: Some(metrics),
            log,
            dead_letter: Some(Arc::new(dead_letter)),
        })
    }
}

pub struct EventBus {
    shared: Arc<Shared>,
    sender: mpsc::UnboundedSender<Arc<Event>>,
    dispatcher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    /// Bus that counts deliveries into `metrics`.
    pub fn with_metrics(metrics: Arc<RunMetrics>) -> Self {
        Self::with_options(BusOptions {
            metrics: Some(metrics),
            ..BusOptions::default()
        })
    }

    pub fn with_options(options: BusOptions) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                subscriptions: RwLock::new(Vec::new()),
                receiver: Mutex::new(receiver),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                metrics: options.metrics.unwrap_or_default(),
                log: options.log,
                dead_letter: options.dead_letter,
            }),
            sender,
            dispatcher: std::sync::Mutex::new(None),
        }
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.shared.metrics
    }

    fn dispatcher_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.dispatcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `handler` for event types matching the glob `pattern`.
    ///
    /// Handlers added to an already registered pattern join the end of that
    /// pattern's list; the pattern keeps its original position.
    pub async fn subscribe(&self, pattern: &str, handler: Handler) -> EventResult<()> {
        let matcher = glob::Pattern::new(pattern).map_err(|e| EventError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.msg.to_string(),
        })?;

        let mut subs = self.shared.subscriptions.write().await;
        match subs.iter_mut().find(|s| s.pattern == pattern) {
            Some(existing) => existing.handlers.push(handler),
            None => subs.push(Subscription {
                pattern: pattern.to_string(),
                matcher,
                handlers: vec![handler],
            }),
        }
        debug!(pattern = %pattern, "subscribed");
        Ok(())
    }

    /// Remove every handler registered under `pattern`. Returns how many were removed.
    pub async fn unsubscribe(&self, pattern: &str) -> usize {
        let mut subs = self.shared.subscriptions.write().await;
        let Some(pos) = subs.iter().position(|s| s.pattern == pattern) else {
            return 0;
        };
        subs.remove(pos).handlers.len()
    }

    /// Registered patterns in dispatch order.
    pub async fn patterns(&self) -> Vec<String> {
        let subs = self.shared.subscriptions.read().await;
        subs.iter().map(|s| s.pattern.clone()).collect()
    }

    /// Enqueue `event` for delivery. Never blocks.
    ///
    /// Events emitted while the bus is stopped stay queued until the next
    /// [`EventBus::start`].
    pub fn emit(&self, event: Event) {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.metrics.inc_events_emitted();
        if self.sender.send(Arc::new(event)).is_err() {
            // Receiver lives in `shared`, so this is unreachable while `self` exists.
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Wrap and enqueue a lifecycle event.
    pub fn emit_lifecycle(&self, event: LifecycleEvent, correlation_id: Option<&str>) {
        self.emit(event.into_event(correlation_id));
    }

    /// Spawn the dispatcher. No-op if already running.
    pub fn start(&self) {
        let mut slot = self.dispatcher_slot();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        *slot = Some(tokio::spawn(dispatch_loop(shared)));
        debug!("event bus started");
    }

    /// Cancel the dispatcher. No-op if not running.
    ///
    /// An event whose delivery was in progress is abandoned: an async handler
    /// running for it is cancelled, while a sync handler already on the
    /// blocking pool finishes on its own. Queued events are not delivered
    /// until the bus is started again.
    pub async fn stop(&self) {
        let handle = self.dispatcher_slot().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            debug!("event bus stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher_slot()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Number of emitted events not yet fully dispatched.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Wait until every event emitted so far has been delivered.
    ///
    /// Only returns while the dispatcher is running; awaiting this on a
    /// stopped bus with queued events waits until someone starts it.
    pub async fn flush(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one received event as done when dropped, including when the
/// dispatcher is aborted mid-delivery.
struct InFlight<'a>(&'a Shared);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.0.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

async fn dispatch_loop(shared: Arc<Shared>) {
    let mut receiver = shared.receiver.lock().await;
    while let Some(event) = receiver.recv().await {
        let _in_flight = InFlight(&shared);
        deliver(&shared, &event).await;
    }
}

async fn deliver(shared: &Shared, event: &Arc<Event>) {
    if let Some(log) = &shared.log {
        if let Err(e) = log.append(event).await {
            warn!(event_id = %event.id, error = %e, "failed to append event to log");
        }
    }

    // Snapshot matching handlers so subscribers can register while a slow
    // handler runs.
    let matched: Vec<(String, Vec<Handler>)> = {
        let subs = shared.subscriptions.read().await;
        subs.iter()
            .filter(|s| s.matcher.matches(&event.event_type))
            .map(|s| (s.pattern.clone(), s.handlers.clone()))
            .collect()
    };

    for (pattern, handlers) in matched {
        for handler in handlers {
            match handler.invoke(event).await {
                Ok(()) => shared.metrics.inc_events_delivered(),
                Err(e) => {
                    shared.metrics.inc_handler_failures();
                    warn!(
                        pattern = %pattern,
                        event_type = %event.event_type,
                        event_id = %event.id,
                        error = %e,
                        "event handler failed"
                    );
                    if let Some(dlq) = &shared.dead_letter {
                        dlq.enqueue_failed(Event::clone(event), 0);
                    }
                }
            }
        }
    }
}
