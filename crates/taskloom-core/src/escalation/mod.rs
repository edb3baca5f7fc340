//! Escalation chain, per-attempt backoff and budget accounting.

pub mod cost;
pub mod error;
pub mod policy;

pub use cost::{CostEntry, CostTracker};
pub use error::{EscalationError, EscalationResult};
pub use policy::EscalationPolicy;
