//! Per-email suspension records.
//!
//! A suspension is an involuntary block on sending, distinct from a
//! voluntary unsubscribe. It is global to the address, with one carve-out:
//! the `essential` section ignores everything except hard bounces.

mod model;
mod repository;

pub use model::SuspensionKind;
pub use repository::SuspensionStore;
