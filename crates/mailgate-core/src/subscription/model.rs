//! Subscription data models.

use std::collections::HashMap;

use crate::section::{GLOBAL_CATEGORY, Section};

/// Why an unsubscribe row was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeReason {
    /// Explicit user action (link click, preference update). Always wins
    /// over [`Self::Inactivity`] on conflict.
    User,
    /// Automatic opt-out after too many sends without an open.
    Inactivity,
}

impl UnsubscribeReason {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "inactivity" => Self::Inactivity,
            _ => Self::User,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Inactivity => "inactivity",
        }
    }
}

/// Snapshot of one email's unsubscribe rows within a single section.
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
    categories: Vec<String>,
    rows: HashMap<String, UnsubscribeReason>,
}

impl SubscriptionInfo {
    pub(crate) fn from_rows(section: &Section, rows: Vec<(String, UnsubscribeReason)>) -> Self {
        Self {
            categories: section.categories().to_vec(),
            rows: rows.into_iter().collect(),
        }
    }

    /// Per-category subscription flags (`true` = still subscribed).
    ///
    /// A global unsubscribe row reports every category as `false`. Empty if
    /// the section declares no categories.
    #[must_use]
    pub fn categories_as_flags(&self) -> HashMap<String, bool> {
        let global = self.rows.contains_key(GLOBAL_CATEGORY);

        self.categories
            .iter()
            .map(|category| {
                (
                    category.clone(),
                    !global && !self.rows.contains_key(category),
                )
            })
            .collect()
    }

    /// The reason a category is unsubscribed, or `None` when subscribed.
    ///
    /// The global row dominates: querying any category reports the global
    /// row's reason when one exists.
    #[must_use]
    pub fn reason(&self, category: &str) -> Option<UnsubscribeReason> {
        if let Some(reason) = self.rows.get(GLOBAL_CATEGORY) {
            return Some(*reason);
        }

        if category == GLOBAL_CATEGORY {
            return None;
        }

        self.rows.get(category).copied()
    }

    /// Whether the given category (or the whole section via `*`) is
    /// unsubscribed.
    #[must_use]
    pub fn is_unsubscribed(&self, category: &str) -> bool {
        self.reason(category).is_some()
    }
}
