//! Adapter workers for the knowledge mesh.
//!
//! One worker fronts one knowledge base: it listens on
//! `{kb_id}.adapter.query`, dispatches the requested operation through a
//! static registry built at startup, and replies with a structured result.
//! Workers know nothing about policies; authorization and masking happen
//! in the enforcement service before and after dispatch.

#![warn(missing_docs, clippy::pedantic)]

mod backend;
mod protocol;
mod registry;
mod table;
mod worker;

pub use backend::KbBackend;
pub use protocol::{AdapterReply, AdapterRequest};
pub use registry::{OperationHandler, OperationRegistry};
pub use table::TableBackend;
pub use worker::AdapterWorker;

use std::time::Duration;

use thiserror::Error;

/// Result alias used by adapter components.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors surfaced by adapter workers and backends.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The requested operation is not in this worker's registry.
    #[error("unknown operation `{operation}`; allowed: {allowed:?}")]
    UnknownOperation {
        /// The rejected operation name.
        operation: String,
        /// Operations the worker actually serves.
        allowed: Vec<String>,
    },

    /// An operation name was registered twice.
    #[error("operation `{operation}` is already registered")]
    DuplicateOperation {
        /// The duplicated operation name.
        operation: String,
    },

    /// An operation name is outside the backend-type vocabulary.
    #[error("operation `{operation}` is not in the {kb_type} vocabulary")]
    ForeignOperation {
        /// The rejected operation name.
        operation: String,
        /// Backend type whose vocabulary was consulted.
        kb_type: String,
    },

    /// The supplied parameters were unusable for the operation.
    #[error("invalid parameters: {reason}")]
    InvalidParams {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The backend driver failed or is unreachable.
    #[error("backend error: {reason}")]
    Backend {
        /// Human-readable context for operators.
        reason: String,
    },

    /// The operation exceeded the worker's hard execution timeout.
    #[error("operation `{operation}` timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// Transport failure while consuming or answering requests.
    #[error(transparent)]
    Transport(#[from] mesh_transport::TransportError),

    /// A request or reply could not be encoded or decoded.
    #[error("adapter serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdapterError {
    /// Convenience constructor for backend failures.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for parameter validation failures.
    #[must_use]
    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            reason: reason.into(),
        }
    }
}
