//! # mailgate-core
//!
//! Email deliverability state engine.
//!
//! Tracks, per recipient address, everything that decides whether a given
//! email may be sent:
//! - **Sections and categories** - the static directory of delivery streams
//! - **Subscriptions** - voluntary opt-outs, per category or whole-section
//! - **Suspensions** - involuntary blocks from bounces and spam complaints
//! - **Bounce counters** - soft-bounce escalation after repeated failures
//! - **Inactivity counters** - automatic unsubscription of silent recipients
//! - **Signed links** - stateless unsubscribe/resubscribe URLs
//!
//! [`DeliverabilityManager`] ties the stores together behind one façade;
//! each store is also usable on its own. Storage is `SQLite` or `MySQL`
//! through a single [`Database`] handle.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod bounce;
pub mod db;
mod error;
pub mod hooks;
pub mod inactivity;
pub mod link;
mod manager;
pub mod section;
pub mod subscription;
pub mod suspension;

pub use mailgate_token::{EncodeMode, Encoder};

pub use batch::EmailBatch;
pub use bounce::{BounceCounterStore, DEFAULT_BOUNCE_LIMIT};
pub use db::{Database, UpsertDialect};
pub use error::{Error, Result};
pub use hooks::{AfterSendEvent, BeforeSendEvent, SendHook};
pub use inactivity::{DEFAULT_MAX_INACTIVITY, InactivityCounterStore};
pub use link::{DecodedAction, DecodedLink, LinkManager};
pub use manager::DeliverabilityManager;
pub use section::{
    GLOBAL_CATEGORY, Section, SectionBlueprint, SectionCategory, SectionError, Sections,
};
pub use subscription::{SubscriptionInfo, SubscriptionStore, UnsubscribeReason};
pub use suspension::{SuspensionKind, SuspensionStore};
