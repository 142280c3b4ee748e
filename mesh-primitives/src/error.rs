//! Shared error definitions and the wire-visible error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the mesh primitives.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error codes surfaced on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request, unknown enum value, or failed schema validation.
    Validation,
    /// Unknown operation for the target adapter type.
    InvalidOperation,
    /// Identity or kb id already registered.
    Duplicate,
    /// Referenced kb or agent is not in the registry.
    UnknownResource,
    /// Policy evaluation denied the request.
    Denied,
    /// The policy evaluator could not be reached; requests fail closed.
    EvaluatorUnavailable,
    /// Adapter worker returned an error or timed out.
    AdapterError,
    /// The audit write failed; the operation is reported as an error.
    AuditFailure,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::InvalidOperation => "INVALID_OPERATION",
            Self::Duplicate => "DUPLICATE",
            Self::UnknownResource => "UNKNOWN_RESOURCE",
            Self::Denied => "DENIED",
            Self::EvaluatorUnavailable => "EVALUATOR_UNAVAILABLE",
            Self::AdapterError => "ADAPTER_ERROR",
            Self::AuditFailure => "AUDIT_FAILURE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while constructing or validating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided identifier could not be parsed as a UUID.
    #[error("invalid uuid identifier: {source}")]
    InvalidUuid {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Knowledge-base identifier failed validation.
    #[error("invalid kb id `{id}`: {reason}")]
    InvalidKbId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Policy identifier failed validation.
    #[error("invalid policy id `{id}`: {reason}")]
    InvalidPolicyId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A registry record failed validation.
    #[error("invalid record: {reason}")]
    InvalidRecord {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// An operation outside the adapter vocabulary was requested.
    #[error("unknown operation `{operation}` for {target}; allowed: {allowed:?}")]
    UnknownOperation {
        /// Adapter type or principal kind the vocabulary belongs to.
        target: String,
        /// The rejected operation name.
        operation: String,
        /// The full allowed set, echoed back to the caller.
        allowed: Vec<&'static str>,
    },
}

impl Error {
    /// Convenience constructor for record validation failures.
    #[must_use]
    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }

    /// Maps the error onto the wire-visible taxonomy.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownOperation { .. } => ErrorCode::InvalidOperation,
            _ => ErrorCode::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::UnknownResource).unwrap();
        assert_eq!(json, "\"UNKNOWN_RESOURCE\"");
        assert_eq!(ErrorCode::EvaluatorUnavailable.as_str(), "EVALUATOR_UNAVAILABLE");
    }

    #[test]
    fn unknown_operation_maps_to_invalid_operation() {
        let err = Error::UnknownOperation {
            target: "postgres".into(),
            operation: "drop_table".into(),
            allowed: vec!["sql_query"],
        };
        assert_eq!(err.code(), ErrorCode::InvalidOperation);
        assert_eq!(Error::invalid_record("nope").code(), ErrorCode::Validation);
    }
}
