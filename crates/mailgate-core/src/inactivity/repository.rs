//! Durable inactivity counter backed by `email_inactivity_counters`.
//!
//! One row per (email, section), incremented on every delivered send and
//! cleared by an open. Unlike the bounce counter there is no row locking:
//! the increment is a single database-native upsert, and losing one count
//! to a race is an accepted approximation — the address still converges to
//! the threshold on subsequent sends.

use sqlx::Row;
use tracing::debug;

use crate::Result;
use crate::db::{Database, placeholders};
use crate::section::Section;

/// Sends without an open tolerated before an address is unsubscribed from
/// the section.
pub const DEFAULT_MAX_INACTIVITY: i64 = 20;

/// Store for per-(email, section) inactivity counters.
#[derive(Debug, Clone)]
pub struct InactivityCounterStore {
    db: Database,
    max_inactivity: i64,
}

impl InactivityCounterStore {
    /// Create a store with [`DEFAULT_MAX_INACTIVITY`].
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self {
            db,
            max_inactivity: DEFAULT_MAX_INACTIVITY,
        }
    }

    /// Override the unsubscription threshold.
    #[must_use]
    pub const fn with_max_inactivity(mut self, max_inactivity: i64) -> Self {
        self.max_inactivity = max_inactivity;
        self
    }

    /// Record one delivered send for every email in the batch.
    ///
    /// Returns the addresses whose counter reached the threshold; their
    /// rows are reset to zero and the caller is expected to unsubscribe
    /// them from the section.
    ///
    /// # Errors
    ///
    /// Returns an error if a database statement fails.
    pub async fn increment(&self, emails: &[String], section: &Section) -> Result<Vec<String>> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let sql = self.db.dialect().upsert(
            "email_inactivity_counters",
            &["email", "section", "counter"],
            emails.len(),
            &["email", "section"],
            Some("counter = counter + 1"),
        );

        let mut query = sqlx::query(&sql);

        for email in emails {
            query = query.bind(email.as_str()).bind(section.name()).bind(1_i64);
        }

        query.execute(self.db.pool()).await?;

        let inactive = self.inactive_emails(section).await?;
        self.reset(&inactive, section).await?;

        if !inactive.is_empty() {
            debug!(
                section = section.name(),
                count = inactive.len(),
                "addresses crossed the inactivity threshold",
            );
        }

        Ok(inactive)
    }

    /// Clear the counters for one section, the "email opened" path.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn reset(&self, emails: &[String], section: &Section) -> Result<()> {
        if emails.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "DELETE FROM email_inactivity_counters WHERE email IN ({}) AND section = ?",
            placeholders(emails.len()),
        );

        let mut query = sqlx::query(&sql);

        for email in emails {
            query = query.bind(email.as_str());
        }

        query.bind(section.name()).execute(self.db.pool()).await?;
        Ok(())
    }

    /// Clear the counters across every section, the full-reset path.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn reset_all_sections(&self, emails: &[String]) -> Result<()> {
        if emails.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "DELETE FROM email_inactivity_counters WHERE email IN ({})",
            placeholders(emails.len()),
        );

        let mut query = sqlx::query(&sql);

        for email in emails {
            query = query.bind(email.as_str());
        }

        query.execute(self.db.pool()).await?;
        Ok(())
    }

    /// Current counter value, zero when no row exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self, email: &str, section: &Section) -> Result<i64> {
        let row = sqlx::query(
            "SELECT counter FROM email_inactivity_counters WHERE email = ? AND section = ?",
        )
        .bind(email)
        .bind(section.name())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map_or(0, |row| row.get(0)))
    }

    async fn inactive_emails(&self, section: &Section) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT email FROM email_inactivity_counters WHERE section = ? AND counter >= ?",
        )
        .bind(section.name())
        .bind(self.max_inactivity)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(|row| row.get("email")).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::section::{SectionBlueprint, Sections};

    const EMAIL: &str = "first@example.com";
    const OTHER: &str = "second@example.com";

    fn sections() -> Sections {
        let mut sections = Sections::new();
        sections.add(SectionBlueprint::new("newsletter")).unwrap();
        sections.add(SectionBlueprint::new("digest")).unwrap();
        sections
    }

    async fn store(max: i64) -> InactivityCounterStore {
        InactivityCounterStore::new(Database::in_memory().await.unwrap())
            .with_max_inactivity(max)
    }

    fn owned(emails: &[&str]) -> Vec<String> {
        emails.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_threshold_crossing() {
        let store = store(3).await;
        let sections = sections();
        let newsletter = sections.section("newsletter").unwrap();

        assert!(
            store
                .increment(&owned(&[EMAIL]), newsletter)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            store
                .increment(&owned(&[EMAIL]), newsletter)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.count(EMAIL, newsletter).await.unwrap(), 2);

        assert_eq!(
            store.increment(&owned(&[EMAIL]), newsletter).await.unwrap(),
            vec![EMAIL.to_string()],
        );
        // Counter is reset once the threshold fires.
        assert_eq!(store.count(EMAIL, newsletter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counters_are_per_section() {
        let store = store(3).await;
        let sections = sections();
        let newsletter = sections.section("newsletter").unwrap();
        let digest = sections.section("digest").unwrap();

        store.increment(&owned(&[EMAIL]), newsletter).await.unwrap();
        store.increment(&owned(&[EMAIL]), newsletter).await.unwrap();
        store.increment(&owned(&[EMAIL]), digest).await.unwrap();

        assert_eq!(store.count(EMAIL, newsletter).await.unwrap(), 2);
        assert_eq!(store.count(EMAIL, digest).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_resets_counter() {
        let store = store(3).await;
        let sections = sections();
        let newsletter = sections.section("newsletter").unwrap();

        store.increment(&owned(&[EMAIL]), newsletter).await.unwrap();
        store.increment(&owned(&[EMAIL]), newsletter).await.unwrap();
        store.reset(&owned(&[EMAIL]), newsletter).await.unwrap();

        assert_eq!(store.count(EMAIL, newsletter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_increment_reports_only_crossers() {
        let store = store(2).await;
        let sections = sections();
        let newsletter = sections.section("newsletter").unwrap();

        store.increment(&owned(&[EMAIL]), newsletter).await.unwrap();

        let crossed = store
            .increment(&owned(&[EMAIL, OTHER]), newsletter)
            .await
            .unwrap();

        assert_eq!(crossed, vec![EMAIL.to_string()]);
        assert_eq!(store.count(OTHER, newsletter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_all_sections() {
        let store = store(5).await;
        let sections = sections();

        store
            .increment(&owned(&[EMAIL]), sections.section("newsletter").unwrap())
            .await
            .unwrap();
        store
            .increment(&owned(&[EMAIL]), sections.section("digest").unwrap())
            .await
            .unwrap();

        store.reset_all_sections(&owned(&[EMAIL])).await.unwrap();

        assert_eq!(
            store
                .count(EMAIL, sections.section("newsletter").unwrap())
                .await
                .unwrap(),
            0,
        );
        assert_eq!(
            store
                .count(EMAIL, sections.section("digest").unwrap())
                .await
                .unwrap(),
            0,
        );
    }
}
