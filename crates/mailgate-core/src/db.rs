//! Shared persistence plumbing: connection pool, schema, and the
//! dialect-specific upsert SQL.
//!
//! All stores share one [`Database`] handle. The upsert syntax differs
//! between MySQL and SQLite, so the dialect is resolved once from the
//! connection URL and rendered into SQL by [`UpsertDialect`]; connecting
//! with any other backend fails loudly at construction time.

use sqlx::AnyPool;
use sqlx::any::{AnyPoolOptions, install_default_drivers};

use crate::{Error, Result};

/// Upsert strategy for the connected backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertDialect {
    /// `INSERT ... ON DUPLICATE KEY UPDATE`, row locking via `FOR UPDATE`.
    MySql,
    /// `INSERT ... ON CONFLICT(...) DO UPDATE`, no row locking.
    Sqlite,
}

impl UpsertDialect {
    /// Resolve the dialect from a connection URL scheme.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedBackend`] for schemes other than
    /// `mysql` and `sqlite`.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or(url);

        match scheme {
            "mysql" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(Error::UnsupportedBackend(other.to_string())),
        }
    }

    /// Render a multi-row upsert statement.
    ///
    /// `on_update` is the pre-rendered conflict action (see
    /// [`Self::update_from_inserted`]); `None` means "do nothing".
    #[must_use]
    pub fn upsert(
        self,
        table: &str,
        columns: &[&str],
        rows: usize,
        conflict: &[&str],
        on_update: Option<&str>,
    ) -> String {
        let row = format!("({})", placeholders(columns.len()));
        let values = vec![row; rows].join(", ");
        let columns = columns.join(", ");

        match self {
            Self::Sqlite => {
                let action = on_update.map_or_else(
                    || "NOTHING".to_string(),
                    |update| format!("UPDATE SET {update}"),
                );

                format!(
                    "INSERT INTO {table} ({columns}) VALUES {values} ON CONFLICT({}) DO {action}",
                    conflict.join(", "),
                )
            }
            Self::MySql => {
                // MySQL has no "do nothing" clause; assigning a key column
                // to itself is the conventional no-op.
                let action = on_update.map_or_else(
                    || format!("{0} = {0}", conflict[0]),
                    ToString::to_string,
                );

                format!("INSERT INTO {table} ({columns}) VALUES {values} ON DUPLICATE KEY UPDATE {action}")
            }
        }
    }

    /// Render `col = <inserted value>` assignments for the conflict action.
    #[must_use]
    pub fn update_from_inserted(self, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|column| match self {
                Self::Sqlite => format!("{column} = excluded.{column}"),
                Self::MySql => format!("{column} = VALUES({column})"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Row-lock suffix for a `SELECT` inside a transaction.
    ///
    /// SQLite has no row-level locking; the suffix is empty there, with the
    /// documented reduced guarantee for concurrent bounce increments.
    #[must_use]
    pub const fn row_lock_suffix(self) -> &'static str {
        match self {
            Self::MySql => " FOR UPDATE",
            Self::Sqlite => "",
        }
    }
}

/// Shared database handle: connection pool plus resolved upsert dialect.
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: UpsertDialect,
}

impl Database {
    /// Connect to the given database URL and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error for unsupported backends, connection failures, or
    /// schema creation failures.
    pub async fn connect(url: &str) -> Result<Self> {
        let dialect = UpsertDialect::from_url(url)?;

        install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        let db = Self { pool, dialect };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Create an in-memory SQLite database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        install_default_drivers();

        // A single connection keeps every query on the same :memory: file.
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self {
            pool,
            dialect: UpsertDialect::Sqlite,
        };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Create the deliverability tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_suspensions (
                email VARCHAR(255) NOT NULL,
                type VARCHAR(30) NOT NULL,
                created_at VARCHAR(32) NOT NULL,
                PRIMARY KEY (email, type)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_subscriptions (
                email VARCHAR(255) NOT NULL,
                section VARCHAR(30) NOT NULL,
                category VARCHAR(30) NOT NULL,
                type VARCHAR(30) NOT NULL,
                created_at VARCHAR(32) NOT NULL,
                PRIMARY KEY (email, section, category)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_bounce_counters (
                email VARCHAR(255) NOT NULL,
                counter BIGINT NOT NULL,
                PRIMARY KEY (email)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_inactivity_counters (
                email VARCHAR(255) NOT NULL,
                section VARCHAR(30) NOT NULL,
                counter BIGINT NOT NULL,
                PRIMARY KEY (email, section)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The shared connection pool.
    #[must_use]
    pub const fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// The upsert dialect resolved at connect time.
    #[must_use]
    pub const fn dialect(&self) -> UpsertDialect {
        self.dialect
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

/// `?, ?, ...` placeholder list for `IN (...)` clauses and VALUES rows.
#[must_use]
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Wall-clock timestamp in the portable `YYYY-MM-DD HH:MM:SS` form used by
/// the `created_at` columns.
pub(crate) fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(
            UpsertDialect::from_url("sqlite::memory:").unwrap(),
            UpsertDialect::Sqlite,
        );
        assert_eq!(
            UpsertDialect::from_url("mysql://user@host/db").unwrap(),
            UpsertDialect::MySql,
        );
        assert!(matches!(
            UpsertDialect::from_url("postgres://host/db"),
            Err(Error::UnsupportedBackend(scheme)) if scheme == "postgres",
        ));
    }

    #[test]
    fn test_upsert_rendering() {
        let sqlite = UpsertDialect::Sqlite;
        let update = sqlite.update_from_inserted(&["type", "created_at"]);

        assert_eq!(
            sqlite.upsert("t", &["a", "b"], 2, &["a"], Some(&update)),
            "INSERT INTO t (a, b) VALUES (?, ?), (?, ?) \
             ON CONFLICT(a) DO UPDATE SET type = excluded.type, created_at = excluded.created_at",
        );
        assert_eq!(
            sqlite.upsert("t", &["a"], 1, &["a"], None),
            "INSERT INTO t (a) VALUES (?) ON CONFLICT(a) DO NOTHING",
        );

        let mysql = UpsertDialect::MySql;

        assert_eq!(
            mysql.upsert("t", &["a", "b"], 1, &["a"], None),
            "INSERT INTO t (a, b) VALUES (?, ?) ON DUPLICATE KEY UPDATE a = a",
        );
        assert_eq!(
            mysql.update_from_inserted(&["created_at"]),
            "created_at = VALUES(created_at)",
        );
    }

    #[tokio::test]
    async fn test_in_memory_schema() {
        let db = Database::in_memory().await.unwrap();

        // Schema creation is idempotent.
        db.ensure_schema().await.unwrap();

        sqlx::query("SELECT email FROM email_suspensions")
            .fetch_all(db.pool())
            .await
            .unwrap();
    }
}
