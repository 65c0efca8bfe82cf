//! The deliverability manager: one façade over sections, stores, counters,
//! and signed links.
//!
//! Per (email, section, category) the conceptual state machine is
//! `Subscribed ⇄ Unsubscribed` crossed with `NotSuspended ⇄ Suspended`;
//! an address is sendable only in the `Subscribed, NotSuspended` corner.
//! Webhook events (bounces, complaints, opens, unsubscribes) and decoded
//! link intents drive the transitions.

use tracing::{debug, info};

use crate::batch::EmailBatch;
use crate::bounce::BounceCounterStore;
use crate::db::Database;
use crate::hooks::{AfterSendEvent, BeforeSendEvent, SendHook};
use crate::inactivity::InactivityCounterStore;
use crate::link::{DecodedAction, DecodedLink, LinkManager};
use crate::section::{GLOBAL_CATEGORY, Sections};
use crate::subscription::{SubscriptionInfo, SubscriptionStore, UnsubscribeReason};
use crate::suspension::{SuspensionKind, SuspensionStore};
use crate::{Error, Result};

/// Orchestrates deliverability state for all sections and stores.
pub struct DeliverabilityManager {
    sections: Sections,
    subscriptions: SubscriptionStore,
    suspensions: SuspensionStore,
    bounces: BounceCounterStore,
    inactivity: InactivityCounterStore,
    links: Option<LinkManager>,
    hooks: Vec<Box<dyn SendHook>>,
}

impl DeliverabilityManager {
    /// Create a manager over a fully populated section catalog.
    #[must_use]
    pub fn new(sections: Sections, db: &Database) -> Self {
        Self {
            sections,
            subscriptions: SubscriptionStore::new(db.clone()),
            suspensions: SuspensionStore::new(db.clone()),
            bounces: BounceCounterStore::new(db.clone()),
            inactivity: InactivityCounterStore::new(db.clone()),
            links: None,
            hooks: Vec::new(),
        }
    }

    /// Enable signed link building and processing.
    #[must_use]
    pub fn with_links(mut self, links: LinkManager) -> Self {
        self.links = Some(links);
        self
    }

    /// Override the soft-bounce escalation threshold.
    #[must_use]
    pub fn with_bounce_limit(mut self, bounce_limit: i64) -> Self {
        self.bounces = self.bounces.with_limit(bounce_limit);
        self
    }

    /// Override the inactivity unsubscription threshold.
    #[must_use]
    pub fn with_max_inactivity(mut self, max_inactivity: i64) -> Self {
        self.inactivity = self.inactivity.with_max_inactivity(max_inactivity);
        self
    }

    /// Register a send hook. Hooks run synchronously, in registration
    /// order.
    pub fn add_hook(&mut self, hook: Box<dyn SendHook>) {
        self.hooks.push(hook);
    }

    /// The section catalog.
    #[must_use]
    pub const fn sections(&self) -> &Sections {
        &self.sections
    }

    /// Whether mail for this section/category may be sent to `email`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown section/category names or a failed
    /// query.
    pub async fn can_send(&self, email: &str, section: &str, category: &str) -> Result<bool> {
        let category = self.sections.category(section, category)?;

        Ok(!self
            .suspensions
            .is_suspended(email, category.section)
            .await?
            && self.subscriptions.is_subscribed(email, &category).await?)
    }

    /// Keep only the addresses that may be sent to.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown section/category names or a failed
    /// query.
    pub async fn filter_for_delivery(
        &self,
        emails: &[String],
        section: &str,
        category: &str,
    ) -> Result<Vec<String>> {
        let category = self.sections.category(section, category)?;

        let suspended = self
            .suspensions
            .suspended_subset(emails, category.section)
            .await?;
        let emails: Vec<String> = emails
            .iter()
            .filter(|email| !suspended.contains(email))
            .cloned()
            .collect();

        self.subscriptions
            .filter_for_delivery(&emails, &category)
            .await
    }

    /// Remove suspended and unsubscribed addresses from the batch, then run
    /// the registered hooks.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown section/category names or a failed
    /// query.
    pub async fn before_send(
        &self,
        batch: &mut EmailBatch,
        section: &str,
        category: &str,
    ) -> Result<()> {
        let resolved = self.sections.category(section, category)?;

        if !batch.is_empty() {
            let suspended = self
                .suspensions
                .suspended_subset(batch.emails(), resolved.section)
                .await?;

            for email in &suspended {
                batch.remove(email);
            }
        }

        if !batch.is_empty() {
            let deliverable = self
                .subscriptions
                .filter_for_delivery(batch.emails(), &resolved)
                .await?;

            for email in batch.emails().to_vec() {
                if !deliverable.contains(&email) {
                    batch.remove(&email);
                }
            }
        }

        let event = BeforeSendEvent {
            section,
            category,
            batch,
        };

        for hook in &self.hooks {
            hook.before_send(&event);
        }

        Ok(())
    }

    /// Account for a completed send: bump inactivity counters and
    /// unsubscribe addresses that crossed the threshold, then run the
    /// registered hooks.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown section/category names or a failed
    /// statement.
    pub async fn after_send(
        &self,
        batch: &EmailBatch,
        section: &str,
        category: &str,
    ) -> Result<()> {
        let resolved = self.sections.category(section, category)?;

        let crossed = self
            .inactivity
            .increment(batch.emails(), resolved.section)
            .await?;

        if !crossed.is_empty() {
            self.subscriptions
                .unsubscribe(
                    &crossed,
                    UnsubscribeReason::Inactivity,
                    &resolved.section.global_category(),
                )
                .await?;
        }

        let event = AfterSendEvent {
            section,
            category,
            batch,
            unsubscribed: &crossed,
        };

        for hook in &self.hooks {
            hook.after_send(&event);
        }

        Ok(())
    }

    /// Record permanent delivery failures: suspend and clear counters.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub async fn hard_bounce(&self, emails: &[String]) -> Result<()> {
        info!(count = emails.len(), "hard bounce");

        self.suspensions
            .suspend(emails, SuspensionKind::HardBounce)
            .await?;
        self.clear_counters(emails).await
    }

    /// Record one transient delivery failure; suspends once the bounce
    /// limit is crossed.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement or the counter transaction fails.
    pub async fn soft_bounce(&self, email: &str) -> Result<()> {
        let escalated = self.bounces.increment(email).await?;

        if !escalated.is_empty() {
            self.suspensions
                .suspend(&escalated, SuspensionKind::SoftBounce)
                .await?;
            self.clear_counters(&escalated).await?;
        }

        Ok(())
    }

    /// Record spam complaints: suspend and clear counters.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub async fn spam_complaint(&self, emails: &[String]) -> Result<()> {
        info!(count = emails.len(), "spam complaint");

        self.suspensions
            .suspend(emails, SuspensionKind::SpamComplaint)
            .await?;
        self.clear_counters(emails).await
    }

    /// Record opens: clears the section's inactivity counters.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown section or a failed delete.
    pub async fn email_opened(&self, emails: &[String], section: &str) -> Result<()> {
        let section = self.sections.section(section)?;

        self.inactivity.reset(emails, section).await
    }

    /// Unsubscribe addresses from a category by explicit user action.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown section/category names or a failed
    /// statement.
    pub async fn unsubscribe(
        &self,
        emails: &[String],
        section: &str,
        category: &str,
    ) -> Result<()> {
        let category = self.sections.category(section, category)?;

        self.subscriptions
            .unsubscribe(emails, UnsubscribeReason::User, &category)
            .await
    }

    /// Remove an unsubscribe, restoring delivery for the category (or the
    /// whole section via the global sentinel).
    ///
    /// # Errors
    ///
    /// Returns an error for unknown section/category names or a failed
    /// statement.
    pub async fn resubscribe(&self, email: &str, section: &str, category: &str) -> Result<()> {
        let category = self.sections.category(section, category)?;

        self.subscriptions.resubscribe(email, &category).await
    }

    /// Replace a section's opt-outs from a category → subscribed map.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown section, a mismatched category set,
    /// or a failed statement.
    pub async fn update_section_flags(
        &self,
        email: &str,
        section: &str,
        flags: &std::collections::HashMap<String, bool>,
    ) -> Result<()> {
        let section = self.sections.section(section)?;

        self.subscriptions
            .update_section_flags(email, section, flags)
            .await
    }

    /// Fully reinstate addresses: drop suspensions, unsubscribes, and
    /// counters.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub async fn reset(&self, emails: &[String]) -> Result<()> {
        self.clear_counters(emails).await?;
        self.subscriptions.reset(emails, None).await?;
        self.suspensions.reset(emails).await
    }

    /// The suspension kinds recorded for an email.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn suspension_reasons(&self, email: &str) -> Result<Vec<SuspensionKind>> {
        self.suspensions.reasons(email).await
    }

    /// Snapshot one email's unsubscribe rows within a section.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown section or a failed query.
    pub async fn subscription_info(&self, email: &str, section: &str) -> Result<SubscriptionInfo> {
        let section = self.sections.section(section)?;

        self.subscriptions.info(email, section).await
    }

    /// Build an unsubscribe link for this section/category.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinksNotConfigured`] without a link manager, or an
    /// error for unknown names.
    pub fn unsubscribe_link(
        &self,
        link: &str,
        email: &str,
        section: &str,
        category: &str,
    ) -> Result<Option<String>> {
        let resolved = self.sections.category(section, category)?;

        self.link_manager()?.unsubscribe_link(link, email, &resolved)
    }

    /// Build a resubscribe link for this section/category.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinksNotConfigured`] without a link manager, or an
    /// error for unknown names.
    pub fn resubscribe_link(
        &self,
        link: &str,
        email: &str,
        section: &str,
        category: &str,
    ) -> Result<Option<String>> {
        let resolved = self.sections.category(section, category)?;

        self.link_manager()?.resubscribe_link(link, email, &resolved)
    }

    /// Decode the intent carried by a clicked link and apply it.
    ///
    /// Untrusted input never fails: a forged token, an unknown section, or
    /// an unknown category is a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinksNotConfigured`] without a link manager, or an
    /// error if applying a valid intent fails.
    pub async fn apply_link(&self, link: &str) -> Result<()> {
        let Some(action) = self.link_manager()?.decode_action(link) else {
            debug!("link carried no valid token");
            return Ok(());
        };

        match action {
            DecodedAction::Unsubscribe(decoded) => {
                let Some((section, category)) = Self::link_target(&decoded) else {
                    return Ok(());
                };

                if self.sections.category(&section, &category).is_err() {
                    return Ok(());
                }

                self.unsubscribe(&[decoded.email], &section, &category).await
            }
            DecodedAction::Resubscribe(decoded) => {
                let Some((section, category)) = Self::link_target(&decoded) else {
                    return Ok(());
                };

                if self.sections.category(&section, &category).is_err() {
                    return Ok(());
                }

                self.resubscribe(&decoded.email, &section, &category).await
            }
        }
    }

    fn link_target(decoded: &DecodedLink) -> Option<(String, String)> {
        let section = decoded.section.clone()?;
        let category = decoded
            .category
            .clone()
            .unwrap_or_else(|| GLOBAL_CATEGORY.to_string());

        Some((section, category))
    }

    fn link_manager(&self) -> Result<&LinkManager> {
        self.links.as_ref().ok_or(Error::LinksNotConfigured)
    }

    async fn clear_counters(&self, emails: &[String]) -> Result<()> {
        self.bounces.reset(emails).await?;
        self.inactivity.reset_all_sections(emails).await
    }
}

impl std::fmt::Debug for DeliverabilityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverabilityManager")
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}
