//! Evaluator trait and policy error definitions.

use async_trait::async_trait;
use mesh_primitives::{ErrorCode, PolicyId, PolicyRecord};
use mesh_store::StoreError;
use thiserror::Error;

use crate::decision::{DecisionInput, PolicyDecision};

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors surfaced by policy evaluation and administration.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The evaluator could not be reached or returned garbage. Callers must
    /// fail closed.
    #[error("policy evaluator unavailable: {reason}")]
    EvaluatorUnavailable {
        /// Human-readable context for operators.
        reason: String,
    },

    /// A policy document failed validation before installation.
    #[error("invalid policy document `{policy_id}`: {reason}")]
    InvalidPolicy {
        /// Identifier of the rejected document.
        policy_id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The on-disk policy mirror could not be written or removed.
    #[error("policy mirror i/o error: {0}")]
    Mirror(#[from] std::io::Error),

    /// A document could not be encoded or decoded.
    #[error("policy serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Policy store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PolicyError {
    /// Convenience constructor for unavailable evaluators.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::EvaluatorUnavailable {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for invalid policy documents.
    #[must_use]
    pub fn invalid_policy(policy_id: &PolicyId, reason: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            policy_id: policy_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Maps the error onto the wire-visible taxonomy. Mirror and store
    /// failures are persistence failures, so they surface like a failed
    /// audit write.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EvaluatorUnavailable { .. } => ErrorCode::EvaluatorUnavailable,
            Self::InvalidPolicy { .. } | Self::Serialization(_) => ErrorCode::Validation,
            Self::Mirror(_) | Self::Store(_) => ErrorCode::AuditFailure,
        }
    }
}

/// Trait implemented by policy evaluators.
///
/// Semantics are default-deny: when no policy speaks to an input, the
/// decision is a denial. When allow and deny rules both fire, deny wins.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluates the supplied input.
    async fn evaluate(&self, input: &DecisionInput) -> PolicyResult<PolicyDecision>;

    /// Installs or replaces a policy document in the evaluator.
    async fn install_policy(&self, record: &PolicyRecord) -> PolicyResult<()>;

    /// Removes a policy document from the evaluator.
    async fn remove_policy(&self, policy_id: &PolicyId) -> PolicyResult<()>;
}
