//! Durable suspension store backed by `email_suspensions`.

use sqlx::Row;

use super::model::SuspensionKind;
use crate::Result;
use crate::db::{Database, placeholders, timestamp};
use crate::section::Section;

/// Store for per-(email, kind) suspension records.
#[derive(Debug, Clone)]
pub struct SuspensionStore {
    db: Database,
}

impl SuspensionStore {
    /// Create a store over the shared database handle.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Whether sending to `email` in this section is blocked.
    ///
    /// Any suspension row blocks a regular section; the `essential` section
    /// is blocked only by a hard bounce.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn is_suspended(&self, email: &str, section: &Section) -> Result<bool> {
        let mut sql = "SELECT 1 FROM email_suspensions WHERE email = ?".to_string();

        if section.is_essential() {
            sql.push_str(" AND type = ?");
        }

        let mut query = sqlx::query(&sql).bind(email);

        if section.is_essential() {
            query = query.bind(SuspensionKind::HardBounce.as_str());
        }

        Ok(query.fetch_optional(self.db.pool()).await?.is_some())
    }

    /// The subset of `emails` that is suspended for this section.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn suspended_subset(
        &self,
        emails: &[String],
        section: &Section,
    ) -> Result<Vec<String>> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT email FROM email_suspensions WHERE email IN ({})",
            placeholders(emails.len()),
        );

        if section.is_essential() {
            sql.push_str(" AND type = ?");
        }

        let mut query = sqlx::query(&sql);

        for email in emails {
            query = query.bind(email.as_str());
        }

        if section.is_essential() {
            query = query.bind(SuspensionKind::HardBounce.as_str());
        }

        let rows = query.fetch_all(self.db.pool()).await?;

        Ok(rows.iter().map(|row| row.get("email")).collect())
    }

    /// Record a suspension for every email. Idempotent: repeating the same
    /// (email, kind) leaves a single row.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn suspend(&self, emails: &[String], kind: SuspensionKind) -> Result<()> {
        if emails.is_empty() {
            return Ok(());
        }

        let sql = self.db.dialect().upsert(
            "email_suspensions",
            &["email", "type", "created_at"],
            emails.len(),
            &["email", "type"],
            None,
        );

        let created_at = timestamp();
        let mut query = sqlx::query(&sql);

        for email in emails {
            query = query
                .bind(email.as_str())
                .bind(kind.as_str())
                .bind(created_at.as_str());
        }

        query.execute(self.db.pool()).await?;
        Ok(())
    }

    /// Manually reinstate addresses by deleting soft-bounce rows, and hard
    /// bounces too when requested. Spam complaints survive; use
    /// [`Self::reset`] to remove everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn activate(&self, emails: &[String], include_hard_bounces: bool) -> Result<()> {
        if emails.is_empty() {
            return Ok(());
        }

        let mut kinds = vec![SuspensionKind::SoftBounce];

        if include_hard_bounces {
            kinds.push(SuspensionKind::HardBounce);
        }

        let sql = format!(
            "DELETE FROM email_suspensions WHERE email IN ({}) AND type IN ({})",
            placeholders(emails.len()),
            placeholders(kinds.len()),
        );

        let mut query = sqlx::query(&sql);

        for email in emails {
            query = query.bind(email.as_str());
        }

        for kind in &kinds {
            query = query.bind(kind.as_str());
        }

        query.execute(self.db.pool()).await?;
        Ok(())
    }

    /// Delete every suspension row for the given emails.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn reset(&self, emails: &[String]) -> Result<()> {
        if emails.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "DELETE FROM email_suspensions WHERE email IN ({})",
            placeholders(emails.len()),
        );

        let mut query = sqlx::query(&sql);

        for email in emails {
            query = query.bind(email.as_str());
        }

        query.execute(self.db.pool()).await?;
        Ok(())
    }

    /// The suspension kinds recorded for an email.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn reasons(&self, email: &str) -> Result<Vec<SuspensionKind>> {
        let rows = sqlx::query("SELECT type FROM email_suspensions WHERE email = ?")
            .bind(email)
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| SuspensionKind::parse(&row.get::<String, _>("type")))
            .collect())
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
        sections.add(SectionBlueprint::new("marketing")).unwrap();
        sections
    }

    async fn store() -> SuspensionStore {
        SuspensionStore::new(Database::in_memory().await.unwrap())
    }

    fn owned(emails: &[&str]) -> Vec<String> {
        emails.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_suspend_blocks_regular_sections() {
        let store = store().await;
        let sections = sections();
        let marketing = sections.section("marketing").unwrap();

        assert!(!store.is_suspended(EMAIL, marketing).await.unwrap());

        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::SpamComplaint)
            .await
            .unwrap();

        assert!(store.is_suspended(EMAIL, marketing).await.unwrap());
        assert!(!store.is_suspended(OTHER, marketing).await.unwrap());
    }

    #[tokio::test]
    async fn test_essential_only_blocked_by_hard_bounce() {
        let store = store().await;
        let sections = sections();
        let essential = sections.essential();

        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::SpamComplaint)
            .await
            .unwrap();
        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::SoftBounce)
            .await
            .unwrap();
        assert!(!store.is_suspended(EMAIL, essential).await.unwrap());

        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::HardBounce)
            .await
            .unwrap();
        assert!(store.is_suspended(EMAIL, essential).await.unwrap());
    }

    #[tokio::test]
    async fn test_suspend_is_idempotent() {
        let store = store().await;

        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::HardBounce)
            .await
            .unwrap();
        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::HardBounce)
            .await
            .unwrap();

        assert_eq!(
            store.reasons(EMAIL).await.unwrap(),
            vec![SuspensionKind::HardBounce],
        );
    }

    #[tokio::test]
    async fn test_activate_keeps_spam_complaints() {
        let store = store().await;
        let sections = sections();
        let marketing = sections.section("marketing").unwrap();

        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::SoftBounce)
            .await
            .unwrap();
        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::HardBounce)
            .await
            .unwrap();
        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::SpamComplaint)
            .await
            .unwrap();

        store.activate(&owned(&[EMAIL]), true).await.unwrap();

        assert_eq!(
            store.reasons(EMAIL).await.unwrap(),
            vec![SuspensionKind::SpamComplaint],
        );
        assert!(store.is_suspended(EMAIL, marketing).await.unwrap());

        store.reset(&owned(&[EMAIL])).await.unwrap();
        assert!(!store.is_suspended(EMAIL, marketing).await.unwrap());
    }

    #[tokio::test]
    async fn test_activate_can_keep_hard_bounces() {
        let store = store().await;

        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::SoftBounce)
            .await
            .unwrap();
        store
            .suspend(&owned(&[EMAIL]), SuspensionKind::HardBounce)
            .await
            .unwrap();

        store.activate(&owned(&[EMAIL]), false).await.unwrap();

        assert_eq!(
            store.reasons(EMAIL).await.unwrap(),
            vec![SuspensionKind::HardBounce],
        );
    }

    #[tokio::test]
    async fn test_suspended_subset() {
        let store = store().await;
        let sections = sections();

        store
            .suspend(&owned(&[OTHER]), SuspensionKind::HardBounce)
            .await
            .unwrap();

        let suspended = store
            .suspended_subset(&owned(&[EMAIL, OTHER]), sections.section("marketing").unwrap())
            .await
            .unwrap();

        assert_eq!(suspended, vec![OTHER.to_string()]);
    }
}
