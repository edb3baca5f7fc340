//! Executable work items.
//!
//! A step's work is either blocking ([`WorkItem::Sync`]) or cooperatively
//! suspending ([`WorkItem::Suspending`]). The variant is chosen when the item
//! is built, so the orchestrator branches on it instead of inspecting the
//! callable. Both produce a JSON result or an error, and both can be invoked
//! again for a retry.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;

pub type SyncWorkFn = dyn Fn() -> anyhow::Result<serde_json::Value> + Send + Sync;
pub type SuspendingWorkFn =
    dyn Fn() -> BoxFuture<'static, anyhow::Result<serde_json::Value>> + Send + Sync;

#[derive(Clone)]
pub enum WorkItem {
    /// Runs on tokio's blocking pool.
    Sync(Arc<SyncWorkFn>),
    /// Polled on the orchestrator's task.
    Suspending(Arc<SuspendingWorkFn>),
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkItem::Sync(_) => f.write_str("WorkItem::Sync"),
            WorkItem::Suspending(_) => f.write_str("WorkItem::Suspending"),
        }
    }
}

impl WorkItem {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        WorkItem::Sync(Arc::new(f))
    }

    pub fn suspending<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        WorkItem::Suspending(Arc::new(move || f().boxed()))
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, WorkItem::Sync(_))
    }

    /// Start one execution. Panics inside the work are reported as errors.
    ///
    /// Dropping the returned future stops a suspending item at its next
    /// await point but does not stop a blocking item already on its worker.
    pub fn execute(&self) -> BoxFuture<'static, anyhow::Result<serde_json::Value>> {
        match self {
            WorkItem::Sync(f) => {
                let f = Arc::clone(f);
                async move {
                    tokio::task::spawn_blocking(move || f())
                        .await
                        .map_err(|e| anyhow!("work item panicked: {e}"))?
                }
                .boxed()
            }
            WorkItem::Suspending(f) => {
                let f = Arc::clone(f);
                // `f` runs on first poll, inside the unwind guard, so a panic
                // while building the future is reported like one raised by it.
                let run = AssertUnwindSafe(async move { f().await }).catch_unwind();
                async move { run.await.map_err(|_| anyhow!("work item panicked"))? }.boxed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sync_and_suspending_produce_results() {
        let blocking = WorkItem::sync(|| Ok(json!("blocking")));
        let suspending = WorkItem::suspending(|| async { Ok(json!("suspending")) });
        assert!(blocking.is_blocking());
        assert!(!suspending.is_blocking());
        assert_eq!(blocking.execute().await.unwrap(), json!("blocking"));
        assert_eq!(suspending.execute().await.unwrap(), json!("suspending"));
    }

    #[tokio::test]
    async fn items_can_run_repeatedly() {
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let c = Arc::clone(&counter);
        let work = WorkItem::sync(move || {
            Ok(json!(c.fetch_add(1, std::sync::atomic::Ordering::SeqCst)))
        });
        assert_eq!(work.execute().await.unwrap(), json!(0));
        assert_eq!(work.execute().await.unwrap(), json!(1));
    }

    fn explode() -> anyhow::Result<serde_json::Value> {
        panic!("boom")
    }

    #[tokio::test]
    async fn panics_are_errors() {
        let blocking = WorkItem::sync(explode);
        let suspending = WorkItem::suspending(|| async { explode() });
        assert!(blocking.execute().await.is_err());
        assert!(suspending.execute().await.is_err());
    }
}
