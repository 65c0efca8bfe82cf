//! Send hooks: explicit, ordered observers of the send pipeline.
//!
//! Hooks replace an implicit global event bus. The manager invokes every
//! registered hook synchronously, in registration order, after its own
//! filtering has run.

use crate::batch::EmailBatch;

/// Snapshot passed to hooks after suspension/subscription filtering.
#[derive(Debug)]
pub struct BeforeSendEvent<'a> {
    /// Target section name.
    pub section: &'a str,
    /// Target category name, or the global sentinel.
    pub category: &'a str,
    /// The filtered batch, removed addresses included.
    pub batch: &'a EmailBatch,
}

/// Snapshot passed to hooks after post-send accounting.
#[derive(Debug)]
pub struct AfterSendEvent<'a> {
    /// Target section name.
    pub section: &'a str,
    /// Target category name, or the global sentinel.
    pub category: &'a str,
    /// The batch that was sent to.
    pub batch: &'a EmailBatch,
    /// Addresses auto-unsubscribed by the inactivity threshold.
    pub unsubscribed: &'a [String],
}

/// Observer of the send pipeline.
pub trait SendHook: Send + Sync {
    /// Called after `before_send` filtering.
    fn before_send(&self, _event: &BeforeSendEvent<'_>) {}

    /// Called after `after_send` accounting.
    fn after_send(&self, _event: &AfterSendEvent<'_>) {}
}
