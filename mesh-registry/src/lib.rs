//! Registry, directory, and health monitoring for the knowledge mesh.
//!
//! The registry is the authoritative catalog of agents and knowledge
//! bases. Every committed change is announced on `mesh.directory.updates`;
//! the directory serves filterable reads over the same rows; the health
//! monitor probes members and walks their status through
//! `active → degraded → offline`.

#![warn(missing_docs, clippy::pedantic)]

mod directory;
mod events;
mod health;
mod service;
pub mod wire;

use mesh_primitives::ErrorCode;
use thiserror::Error;

pub use directory::{DirectoryReply, DirectoryQueryRequest, DirectoryScope, DirectoryService};
pub use events::{DirectoryEvent, DirectoryEventKind};
pub use health::{HealthMonitor, HealthMonitorConfig, HealthProbe, HttpHealthProbe};
pub use service::RegistryService;

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the registry surfaces.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Request failed validation (bad record, unknown operation, bad enum).
    #[error(transparent)]
    Validation(#[from] mesh_primitives::Error),

    /// Identity or kb id is already registered.
    #[error("{kind} `{id}` is already registered")]
    Duplicate {
        /// Row kind (`agent` or `kb`).
        kind: &'static str,
        /// The taken unique key.
        id: String,
    },

    /// Referenced agent or knowledge base is not in the registry.
    #[error("{kind} `{id}` not found in registry")]
    NotFound {
        /// Row kind (`agent` or `kb`).
        kind: &'static str,
        /// The missing key.
        id: String,
    },

    /// A probe against a member failed.
    #[error("probe of `{target}` failed: {reason}")]
    ProbeFailed {
        /// The probed agent identity or kb id.
        target: String,
        /// Human-readable failure context.
        reason: String,
    },

    /// The audit row could not be written; the operation fails.
    #[error("audit write failed: {reason}")]
    AuditFailure {
        /// Human-readable failure context.
        reason: String,
    },

    /// Store failure other than duplicate/not-found.
    #[error("registry store error: {reason}")]
    Store {
        /// Human-readable failure context.
        reason: String,
    },
}

impl RegistryError {
    /// Maps the error onto the wire-visible taxonomy.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(err) => err.code(),
            Self::Duplicate { .. } => ErrorCode::Duplicate,
            Self::NotFound { .. } => ErrorCode::UnknownResource,
            // Store failures are persistence failures; per the taxonomy they
            // surface like a failed audit write and the operator inspects
            // the store.
            Self::AuditFailure { .. } | Self::Store { .. } => ErrorCode::AuditFailure,
            Self::ProbeFailed { .. } => ErrorCode::Validation,
        }
    }
}

impl From<mesh_store::StoreError> for RegistryError {
    fn from(err: mesh_store::StoreError) -> Self {
        match err {
            mesh_store::StoreError::Duplicate { kind, id } => Self::Duplicate { kind, id },
            mesh_store::StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Store {
                reason: other.to_string(),
            },
        }
    }
}
