//! Soft-bounce counting with threshold-triggered escalation.

mod repository;

pub use repository::{BounceCounterStore, DEFAULT_BOUNCE_LIMIT};
