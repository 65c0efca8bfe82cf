//! Send-without-open counting with threshold-triggered unsubscription.

mod repository;

pub use repository::{DEFAULT_MAX_INACTIVITY, InactivityCounterStore};
