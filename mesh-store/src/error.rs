//! Store error definitions.

use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same unique key already exists.
    #[error("{kind} `{id}` is already registered")]
    Duplicate {
        /// Row kind (`agent`, `kb`, ...).
        kind: &'static str,
        /// Offending unique key.
        id: String,
    },

    /// The referenced row does not exist.
    #[error("{kind} `{id}` not found")]
    NotFound {
        /// Row kind (`agent`, `kb`, ...).
        kind: &'static str,
        /// Missing key.
        id: String,
    },

    /// A stored document could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend failure (connection, constraint, I/O).
    #[error("store backend error: {reason}")]
    Backend {
        /// Human-readable context for operators.
        reason: String,
    },
}

impl StoreError {
    /// Convenience constructor for backend failures.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    /// Returns `true` for unique-key violations.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Returns `true` for missing-row errors.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
