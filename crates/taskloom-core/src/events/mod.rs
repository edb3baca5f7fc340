//! Event fabric: envelopes, pub/sub bus, durable log and dead-letter retry.
//!
//! Executors publish [`LifecycleEvent`]s through an [`EventBus`]; other
//! subsystems observe orchestration solely by subscribing with glob patterns
//! such as `task.*` or `escalation.*`.

pub mod bus;
pub mod dead_letter;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod log;

pub use bus::{BusOptions, EventBus};
pub use dead_letter::{DeadLetterQueue, FailedEvent};
pub use envelope::{Event, LifecycleEvent};
pub use error::{EventError, EventResult};
pub use handler::{EventHandler, Handler};
pub use log::EventLog;
