//! Durable soft-bounce counter backed by `email_bounce_counters`.
//!
//! This is the one concurrency-sensitive path in the system: two bounce
//! notifications for the same address arriving together must neither
//! under-count nor escalate twice. The counter is read under a row lock
//! inside a short transaction on backends that support it; SQLite has no
//! row locking, a documented reduced guarantee.

use sqlx::Row;
use tracing::{info, warn};

use crate::Result;
use crate::db::{Database, placeholders};

/// Soft bounces tolerated before an address is escalated to suspension.
pub const DEFAULT_BOUNCE_LIMIT: i64 = 3;

/// Store for per-email soft-bounce counters.
#[derive(Debug, Clone)]
pub struct BounceCounterStore {
    db: Database,
    bounce_limit: i64,
}

impl BounceCounterStore {
    /// Create a store with [`DEFAULT_BOUNCE_LIMIT`].
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self {
            db,
            bounce_limit: DEFAULT_BOUNCE_LIMIT,
        }
    }

    /// Override the escalation threshold.
    #[must_use]
    pub const fn with_limit(mut self, bounce_limit: i64) -> Self {
        self.bounce_limit = bounce_limit;
        self
    }

    /// Record one soft bounce for `email`.
    ///
    /// Returns the addresses that just crossed the bounce limit — empty, or
    /// `[email]`. Suspending them is the caller's responsibility. Once the
    /// limit is reached the counter row is deleted; a failure of that
    /// cleanup is logged and swallowed so the escalation is never lost.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; the increment is rolled
    /// back, never half-applied.
    pub async fn increment(&self, email: &str) -> Result<Vec<String>> {
        let mut tx = self.db.pool().begin().await?;

        let sql = format!(
            "SELECT counter FROM email_bounce_counters WHERE email = ?{}",
            self.db.dialect().row_lock_suffix(),
        );

        let counter: i64 = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?
            .map_or(0, |row| row.get(0));

        let counter = counter + 1;

        if counter >= self.bounce_limit {
            tx.commit().await?;

            if let Err(error) = self.reset(&[email.to_string()]).await {
                warn!(email, %error, "failed to clear bounce counter after escalation");
            }

            info!(email, counter, "soft bounce limit reached");
            return Ok(vec![email.to_string()]);
        }

        let sql = self.db.dialect().upsert(
            "email_bounce_counters",
            &["email", "counter"],
            1,
            &["email"],
            Some("counter = counter + 1"),
        );

        sqlx::query(&sql)
            .bind(email)
            .bind(1_i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Vec::new())
    }

    /// Delete the counters for the given emails.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn reset(&self, emails: &[String]) -> Result<()> {
        if emails.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "DELETE FROM email_bounce_counters WHERE email IN ({})",
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
    pub async fn count(&self, email: &str) -> Result<i64> {
        let row = sqlx::query("SELECT counter FROM email_bounce_counters WHERE email = ?")
            .bind(email)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map_or(0, |row| row.get(0)))
    }
}
