//! Bounded-concurrency DAG executor.
//!
//! Items are released strictly when their last dependency completes, never
//! speculatively. A semaphore of `max_workers` permits bounds how many run at
//! once. All children live in one [`JoinSet`] owned by the call: the first
//! failure aborts every running sibling and nothing further is scheduled, and
//! dropping the returned future cancels everything it spawned.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::config::RuntimeConfig;
use crate::context::ExecutionContext;
use crate::events::{EventBus, LifecycleEvent};
use crate::obs;
use crate::parallel::error::{ItemFailure, ParallelError, ParallelResult};

/// `agent_id` reported in `task.started` events from this executor.
pub const PARALLEL_AGENT: &str = "parallel_executor";

/// A named unit of work and the names it waits for.
#[derive(Debug, Clone, PartialEq)]
pub struct DagItem<P> {
    pub name: String,
    pub depends_on: Vec<String>,
    pub payload: P,
}

impl<P> DagItem<P> {
    pub fn new(name: impl Into<String>, depends_on: Vec<String>, payload: P) -> Self {
        Self {
            name: name.into(),
            depends_on,
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    max_workers: usize,
    item_timeout: Option<Duration>,
    bus: Option<Arc<EventBus>>,
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

/// Validated dependency structure, indexed by item position.
struct Plan {
    in_degree: Vec<usize>,
    dependents: Vec<Vec<usize>>,
}

fn plan<P>(items: &[Arc<DagItem<P>>]) -> ParallelResult<Plan> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if index.insert(item.name.as_str(), i).is_some() {
            return Err(ParallelError::DuplicateItem {
                name: item.name.clone(),
            });
        }
    }

    let mut in_degree = vec![0; items.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    for (i, item) in items.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &item.depends_on {
            let Some(&d) = index.get(dep.as_str()) else {
                return Err(ParallelError::UnknownDependency {
                    item: item.name.clone(),
                    dependency: dep.clone(),
                });
            };
            if seen.insert(d) {
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }
    }

    // Dry-run Kahn's algorithm so a cycle is rejected before anything runs.
    let mut remaining = in_degree.clone();
    let mut ready: Vec<usize> = (0..items.len()).filter(|&i| remaining[i] == 0).collect();
    let mut visited = 0;
    while let Some(i) = ready.pop() {
        visited += 1;
        for &d in &dependents[i] {
            remaining[d] -= 1;
            if remaining[d] == 0 {
                ready.push(d);
            }
        }
    }
    if visited < items.len() {
        return Err(ParallelError::Cycle {
            unresolved: items.len() - visited,
            total: items.len(),
        });
    }

    Ok(Plan {
        in_degree,
        dependents,
    })
}

impl ParallelExecutor {
    /// Executor admitting at most `max_workers` items at once (minimum 1).
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            item_timeout: None,
            bus: None,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        let executor = Self::new(config.max_workers);
        match config.item_timeout() {
            Some(timeout) => executor.with_item_timeout(timeout),
            None => executor,
        }
    }

    /// Fail any item still running after `timeout`.
    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = Some(timeout);
        self
    }

    /// Publish `task.*` lifecycle events for each item.
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run every item once, each after all of its dependencies succeeded.
    ///
    /// `work` receives the item's full record. Returns a name → result map
    /// once every item has finished, or [`ParallelError::ItemsFailed`]
    /// naming the failed item(s) and everything cancelled because of them.
    /// Validation errors are returned before any item runs.
    #[instrument(skip(self, ctx, items, work), fields(plan_id = %ctx.plan_id, items = items.len()))]
    pub async fn execute_dag<P, R, F, Fut>(
        &self,
        ctx: &ExecutionContext,
        items: Vec<DagItem<P>>,
        work: F,
    ) -> ParallelResult<HashMap<String, R>>
    where
        P: Send + Sync + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<DagItem<P>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let items: Vec<Arc<DagItem<P>>> = items.into_iter().map(Arc::new).collect();
        let Plan {
            mut in_degree,
            dependents,
        } = plan(&items)?;

        let work = Arc::new(work);
        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut set: JoinSet<(usize, anyhow::Result<R>)> = JoinSet::new();
        let mut scheduled: HashSet<usize> = HashSet::with_capacity(items.len());

        let spawn = |i: usize, set: &mut JoinSet<(usize, anyhow::Result<R>)>| {
            let item = Arc::clone(&items[i]);
            let work = Arc::clone(&work);
            let permits = Arc::clone(&permits);
            let bus = self.bus.clone();
            let correlation_id = ctx.correlation_id.clone();
            let metrics = Arc::clone(&ctx.metrics);
            let timeout = self.item_timeout;
            set.spawn(async move {
                let name = item.name.clone();
                // `work` is invoked inside the guarded future, so a closure
                // that panics before returning its future is caught as well.
                let body = async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| anyhow!("admission semaphore closed: {e}"))?;
                    metrics.inc_steps_started();
                    if let Some(bus) = &bus {
                        bus.emit_lifecycle(
                            LifecycleEvent::TaskStarted {
                                task_id: item.name.clone(),
                                agent_id: PARALLEL_AGENT.to_string(),
                            },
                            Some(&correlation_id),
                        );
                    }
                    let label = item.name.clone();
                    let run = async move { work(item).await };
                    match timeout {
                        Some(limit) => match tokio::time::timeout(limit, run).await {
                            Ok(result) => result,
                            Err(_) => {
                                let ms = limit.as_millis();
                                Err(anyhow!("item '{label}' timed out after {ms}ms"))
                            }
                        },
                        None => run.await,
                    }
                };
                let result = AssertUnwindSafe(body)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(anyhow!("item '{name}' panicked")));
                (i, result)
            });
        };

        for i in 0..items.len() {
            if in_degree[i] == 0 && scheduled.insert(i) {
                spawn(i, &mut set);
            }
        }

        let mut results: HashMap<String, R> = HashMap::with_capacity(items.len());
        let mut done: HashSet<usize> = HashSet::with_capacity(items.len());
        let mut failed: Vec<ItemFailure> = Vec::new();
        let mut halted = false;

        while let Some(joined) = set.join_next().await {
            let (i, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    // Aborted siblings end up here, as would a panic escaping
                    // the guarded body (e.g. while dropping a result). The
                    // latter cannot be traced to its item; stop scheduling and
                    // let the completeness check below report it.
                    if e.is_panic() && !halted {
                        warn!(error = %e, "item task panicked outside its work");
                        halted = true;
                        set.abort_all();
                    }
                    continue;
                }
            };
            let name = &items[i].name;
            done.insert(i);

            match result {
                Ok(value) => {
                    ctx.metrics.inc_steps_succeeded();
                    debug!(item = %name, "item completed");
                    if let Some(bus) = &self.bus {
                        bus.emit_lifecycle(
                            LifecycleEvent::TaskCompleted {
                                task_id: name.clone(),
                                result: serde_json::to_value(&value)
                                    .unwrap_or(serde_json::Value::Null),
                            },
                            Some(&ctx.correlation_id),
                        );
                    }
                    results.insert(name.clone(), value);

                    if !failed.is_empty() || halted {
                        continue;
                    }
                    for &d in &dependents[i] {
                        in_degree[d] -= 1;
                        if in_degree[d] == 0 && scheduled.insert(d) {
                            spawn(d, &mut set);
                        }
                    }
                }
                Err(e) => {
                    ctx.metrics.inc_steps_failed();
                    let error = format!("{e:#}");
                    warn!(item = %name, error = %error, "item failed");
                    if let Some(bus) = &self.bus {
                        bus.emit_lifecycle(
                            LifecycleEvent::TaskFailed {
                                task_id: name.clone(),
                                error: error.clone(),
                            },
                            Some(&ctx.correlation_id),
                        );
                    }
                    if failed.is_empty() && !halted {
                        set.abort_all();
                    }
                    failed.push(ItemFailure {
                        name: name.clone(),
                        error,
                    });
                }
            }
        }

        if halted || (failed.is_empty() && done.len() < items.len()) {
            // Never report success with items missing: anything scheduled that
            // did not report back is a failure of its own.
            let mut lost: Vec<ItemFailure> = (0..items.len())
                .filter(|i| scheduled.contains(i) && !done.contains(i))
                .map(|i| ItemFailure {
                    name: items[i].name.clone(),
                    error: format!("item '{}' ended without a result", items[i].name),
                })
                .collect();
            lost.sort_by(|a, b| a.name.cmp(&b.name));
            failed.extend(lost);
        }

        if !failed.is_empty() {
            let mut cancelled: Vec<String> = (0..items.len())
                .filter(|i| !done.contains(i))
                .map(|i| items[i].name.clone())
                .filter(|name| failed.iter().all(|f| &f.name != name))
                .collect();
            cancelled.sort();
            obs::emit_items_cancelled(&failed[0].name, cancelled.len());
            return Err(ParallelError::ItemsFailed { failed, cancelled });
        }

        Ok(results)
    }
}
