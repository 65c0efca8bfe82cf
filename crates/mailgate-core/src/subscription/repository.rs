//! Durable subscription store backed by `email_subscriptions`.

use std::collections::HashSet;

use sqlx::Row;

use super::model::{SubscriptionInfo, UnsubscribeReason};
use crate::Result;
use crate::db::{Database, placeholders, timestamp};
use crate::section::{GLOBAL_CATEGORY, Section, SectionCategory};

/// Store for per-(email, section, category) unsubscribe records.
#[derive(Debug, Clone)]
pub struct SubscriptionStore {
    db: Database,
}

impl SubscriptionStore {
    /// Create a store over the shared database handle.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Whether mail for this category may be sent to `email`.
    ///
    /// Non-unsubscribable sections always report `true`. Otherwise a row for
    /// the category itself or for the global sentinel means unsubscribed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn is_subscribed(
        &self,
        email: &str,
        category: &SectionCategory<'_>,
    ) -> Result<bool> {
        if !category.is_unsubscribable() {
            return Ok(true);
        }

        let names = Self::match_categories(category);
        let sql = format!(
            "SELECT 1 FROM email_subscriptions \
             WHERE email = ? AND section = ? AND category IN ({})",
            placeholders(names.len()),
        );

        let mut query = sqlx::query(&sql).bind(email).bind(category.section.name());

        for name in &names {
            query = query.bind(*name);
        }

        Ok(query.fetch_optional(self.db.pool()).await?.is_none())
    }

    /// Keep only the emails still subscribed to this category.
    ///
    /// Bulk variant of [`Self::is_subscribed`], used before dispatching a
    /// batch. Input order is preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn filter_for_delivery(
        &self,
        emails: &[String],
        category: &SectionCategory<'_>,
    ) -> Result<Vec<String>> {
        let unsubscribed = self.unsubscribed_index(emails, category).await?;

        Ok(emails
            .iter()
            .filter(|email| !unsubscribed.contains(email.as_str()))
            .cloned()
            .collect())
    }

    /// Record an unsubscribe for every email in the batch.
    ///
    /// No-op for non-unsubscribable sections. A global unsubscribe by user
    /// action first clears every row of the section, so a global row never
    /// coexists with category rows. Conflicting rows follow the upgrade
    /// rule: `User` overwrites `Inactivity`, never the other way around.
    ///
    /// # Errors
    ///
    /// Returns an error if a database statement fails.
    pub async fn unsubscribe(
        &self,
        emails: &[String],
        reason: UnsubscribeReason,
        category: &SectionCategory<'_>,
    ) -> Result<()> {
        if emails.is_empty() || !category.is_unsubscribable() {
            return Ok(());
        }

        if category.is_global() && reason == UnsubscribeReason::User {
            self.reset(emails, Some(category.section)).await?;
        } else {
            // Any fresh signal supersedes the section's stale inactivity rows;
            // the row being written is re-inserted below.
            self.record_activity(emails, category.section).await?;
        }

        self.insert_unsubscribes(emails, reason, category.section, &[category.name()])
            .await
    }

    /// Remove the unsubscribe for one category, or every row of the section
    /// when the global category is given.
    ///
    /// # Errors
    ///
    /// Returns an error if a database statement fails.
    pub async fn resubscribe(&self, email: &str, category: &SectionCategory<'_>) -> Result<()> {
        let emails = [email.to_string()];

        self.record_activity(&emails, category.section).await?;

        if category.is_global() {
            return self.reset(&emails, Some(category.section)).await;
        }

        sqlx::query(
            "DELETE FROM email_subscriptions WHERE email = ? AND section = ? AND category = ?",
        )
        .bind(email)
        .bind(category.section.name())
        .bind(category.name())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Replace a section's rows from a category → subscribed map.
    ///
    /// The map must name exactly the section's categories. All-`false`
    /// collapses to a single global row; otherwise one row per `false`
    /// entry is written.
    ///
    /// # Errors
    ///
    /// Returns an error for a mismatched category set or a failed
    /// statement.
    pub async fn update_section_flags(
        &self,
        email: &str,
        section: &Section,
        flags: &std::collections::HashMap<String, bool>,
    ) -> Result<()> {
        let names: Vec<&str> = flags.keys().map(String::as_str).collect();
        section.validate_categories(&names)?;

        let unset_all = flags.values().all(|subscribed| !subscribed);
        let categories: Vec<&str> = if unset_all {
            vec![GLOBAL_CATEGORY]
        } else {
            flags
                .iter()
                .filter(|(_, subscribed)| !**subscribed)
                .map(|(category, _)| category.as_str())
                .collect()
        };

        let emails = [email.to_string()];
        self.reset(&emails, Some(section)).await?;

        if categories.is_empty() {
            return Ok(());
        }

        self.insert_unsubscribes(&emails, UnsubscribeReason::User, section, &categories)
            .await
    }

    /// Delete unsubscribe rows, optionally scoped to one section.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn reset(&self, emails: &[String], section: Option<&Section>) -> Result<()> {
        if emails.is_empty() {
            return Ok(());
        }

        let mut sql = format!(
            "DELETE FROM email_subscriptions WHERE email IN ({})",
            placeholders(emails.len()),
        );

        if section.is_some() {
            sql.push_str(" AND section = ?");
        }

        let mut query = sqlx::query(&sql);

        for email in emails {
            query = query.bind(email.as_str());
        }

        if let Some(section) = section {
            query = query.bind(section.name());
        }

        query.execute(self.db.pool()).await?;
        Ok(())
    }

    /// Drop stale inactivity-reason rows for a section.
    ///
    /// Any fresh explicit signal from the address supersedes an automatic
    /// inactivity opt-out.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn record_activity(&self, emails: &[String], section: &Section) -> Result<()> {
        if emails.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "DELETE FROM email_subscriptions \
             WHERE email IN ({}) AND section = ? AND type = ?",
            placeholders(emails.len()),
        );

        let mut query = sqlx::query(&sql);

        for email in emails {
            query = query.bind(email.as_str());
        }

        query
            .bind(section.name())
            .bind(UnsubscribeReason::Inactivity.as_str())
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Snapshot one email's rows within a section.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn info(&self, email: &str, section: &Section) -> Result<SubscriptionInfo> {
        let rows = sqlx::query(
            "SELECT category, type FROM email_subscriptions WHERE email = ? AND section = ?",
        )
        .bind(email)
        .bind(section.name())
        .fetch_all(self.db.pool())
        .await?;

        let rows = rows
            .iter()
            .map(|row| {
                (
                    row.get::<String, _>("category"),
                    UnsubscribeReason::parse(&row.get::<String, _>("type")),
                )
            })
            .collect();

        Ok(SubscriptionInfo::from_rows(section, rows))
    }

    async fn insert_unsubscribes(
        &self,
        emails: &[String],
        reason: UnsubscribeReason,
        section: &Section,
        categories: &[&str],
    ) -> Result<()> {
        if !section.is_unsubscribable() {
            return Ok(());
        }

        let update = match reason {
            UnsubscribeReason::User => self
                .db
                .dialect()
                .update_from_inserted(&["type", "created_at"]),
            // Refuse the downgrade: an existing user row keeps its reason.
            UnsubscribeReason::Inactivity => {
                self.db.dialect().update_from_inserted(&["created_at"])
            }
        };

        let sql = self.db.dialect().upsert(
            "email_subscriptions",
            &["email", "section", "category", "type", "created_at"],
            emails.len() * categories.len(),
            &["email", "section", "category"],
            Some(&update),
        );

        let created_at = timestamp();
        let mut query = sqlx::query(&sql);

        for email in emails {
            for category in categories {
                query = query
                    .bind(email.as_str())
                    .bind(section.name())
                    .bind(*category)
                    .bind(reason.as_str())
                    .bind(created_at.as_str());
            }
        }

        query.execute(self.db.pool()).await?;
        Ok(())
    }

    async fn unsubscribed_index(
        &self,
        emails: &[String],
        category: &SectionCategory<'_>,
    ) -> Result<HashSet<String>> {
        if emails.is_empty() {
            return Ok(HashSet::new());
        }

        let names = Self::match_categories(category);
        let sql = format!(
            "SELECT email FROM email_subscriptions \
             WHERE email IN ({}) AND section = ? AND category IN ({})",
            placeholders(emails.len()),
            placeholders(names.len()),
        );

        let mut query = sqlx::query(&sql);

        for email in emails {
            query = query.bind(email.as_str());
        }

        query = query.bind(category.section.name());

        for name in &names {
            query = query.bind(*name);
        }

        let rows = query.fetch_all(self.db.pool()).await?;

        Ok(rows.iter().map(|row| row.get("email")).collect())
    }

    /// Category names matching a read: the category itself plus the global
    /// sentinel, which dominates.
    fn match_categories<'a>(category: &SectionCategory<'a>) -> Vec<&'a str> {
        if category.is_global() {
            vec![GLOBAL_CATEGORY]
        } else {
            vec![category.name(), GLOBAL_CATEGORY]
        }
    }
}
