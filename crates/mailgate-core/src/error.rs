//! Error types for the core library.

use thiserror::Error;

use crate::section::SectionError;

/// Errors that can occur in deliverability operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The database URL names a backend without portable upsert support.
    #[error("unsupported database backend: {0}")]
    UnsupportedBackend(String),

    /// Invalid section or category configuration or lookup.
    #[error(transparent)]
    Section(#[from] SectionError),

    /// A signed link already carries the query parameter being added.
    #[error("link already contains a `{0}` parameter")]
    LinkParameterExists(String),

    /// A link operation was requested but no link manager is configured.
    #[error("link manager is not configured")]
    LinksNotConfigured,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
