//! Per-(email, section, category) unsubscribe records.
//!
//! A row in `email_subscriptions` means "do not send"; absence means
//! subscribed. A row for the global `*` category dominates every
//! per-category row of its section. Rows carry the reason they were
//! written: an explicit user action always wins over an automatic
//! inactivity opt-out.

mod model;
mod repository;

pub use model::{SubscriptionInfo, UnsubscribeReason};
pub use repository::SubscriptionStore;
