//! SQLite-backed durable repositories.
//!
//! Connections come from an `r2d2` pool whose customizer applies WAL,
//! `foreign_keys` and `busy_timeout` pragmas. Schema changes are embedded
//! migrations applied by [`open_pool`].

pub mod connection;
pub mod migrations;
pub mod rooms;
pub mod tasks;

use estimo_core::EstimoError;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, open_pool};
pub use rooms::SqliteRoomRepository;
pub use tasks::SqliteTaskRepository;

use crate::errors::StoreError;

/// Fold any backend failure into the domain's storage error.
pub(crate) fn storage_err(err: impl Into<StoreError>) -> EstimoError {
    err.into().into()
}

/// Whether a `rusqlite` error is a constraint violation (duplicate key, dangling FK).
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
