//! Subscriber callbacks.
//!
//! A handler is either blocking ([`Handler::Sync`], run on tokio's blocking
//! pool so it cannot stall the runtime) or cooperatively suspending
//! ([`Handler::Async`]). Both are awaited by the caller; a panic inside
//! either is reported as an error rather than unwinding into the dispatcher.

use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::events::envelope::Event;

/// Asynchronous subscriber.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Blocking subscriber callback.
pub type SyncHandlerFn = dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync;

#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncHandlerFn>),
    Async(Arc<dyn EventHandler>),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

struct FnHandler<F>(F);

/// Aborts the spawned handler task if the delivery awaiting it is dropped.
struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.0)(event.clone()).await
    }
}

impl Handler {
    /// Blocking closure handler.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    /// Async closure handler; the closure receives an owned copy of the event.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Handler::Async(Arc::new(FnHandler(f)))
    }

    pub fn from_handler<H: EventHandler + 'static>(handler: H) -> Self {
        Handler::Async(Arc::new(handler))
    }

    /// Run the handler to completion.
    ///
    /// Dropping the returned future cancels an async handler at its next
    /// await point. A sync handler already running on the blocking pool
    /// cannot be interrupted and runs to completion.
    pub async fn invoke(&self, event: &Arc<Event>) -> anyhow::Result<()> {
        let event = Arc::clone(event);
        let joined = match self {
            Handler::Sync(f) => {
                let f = Arc::clone(f);
                tokio::task::spawn_blocking(move || f(&event)).await
            }
            Handler::Async(h) => {
                let h = Arc::clone(h);
                let task = tokio::spawn(async move { h.handle(&event).await });
                let _abort = AbortOnDrop(task.abort_handle());
                task.await
            }
        };
        joined.map_err(|e| anyhow!("handler panicked: {e}"))?
    }
}
