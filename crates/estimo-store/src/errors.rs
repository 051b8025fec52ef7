//! Errors raised by the SQLite backend.
//!
//! Repository methods return [`EstimoError`] at the port boundary; the
//! variants here cover connection setup and migrations, and fold into
//! [`EstimoError::Storage`] when they cross it.

use estimo_core::EstimoError;
use thiserror::Error;

/// Errors that can occur while opening or migrating the database.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },
}

impl From<StoreError> for EstimoError {
    fn from(err: StoreError) -> Self {
        EstimoError::Storage(err.to_string())
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
