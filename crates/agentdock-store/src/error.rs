//! Error types for the agentdock-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Uses `thiserror` for ergonomic, zero-cost error definitions.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An operation was attempted before the store finished initializing.
    #[error("database not initialized: cannot {operation}")]
    StoreNotReady { operation: &'static str },

    /// A statement was malformed, referenced a missing table/column, or
    /// violated a constraint.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// The durable slot facility could not be reached.
    #[error("durable slot `{key}` unavailable: {reason}")]
    SlotUnavailable { key: String, reason: String },

    /// Bytes were found in the durable slot but are not a usable image.
    #[error("relational image corrupt: {0}")]
    ImageCorrupt(String),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl StoreError {
    /// Whether the error leaves the process without a usable store.
    ///
    /// Fatal errors are reported to the host's lifecycle machinery; the
    /// rest are ordinary operation failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SlotUnavailable { .. }
                | Self::ImageCorrupt(_)
                | Self::Migration { .. }
                | Self::TaskJoin(_)
        )
    }

    pub(crate) fn slot(key: &str, reason: impl std::fmt::Display) -> Self {
        Self::SlotUnavailable {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
