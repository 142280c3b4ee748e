//! Wire-level structures for the routing, audit, and health subjects.

use chrono::{DateTime, Utc};
use mesh_primitives::{AuditEvent, AuditFilter, ErrorCode, RequestId, TrackingId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::invocation::InvocationState;

/// Request received on `mesh.routing.kb_query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbQueryRequest {
    /// Identity of the requesting agent.
    pub requester_id: String,
    /// Target knowledge base.
    pub kb_id: String,
    /// Operation from the backend vocabulary.
    pub operation: String,
    /// Operation parameters, forwarded verbatim.
    #[serde(default)]
    pub params: Value,
    /// Correlation id; assigned by the router when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

/// Request received on `mesh.routing.agent_invoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInvokeRequest {
    /// Identity of the invoking agent.
    pub source_agent_id: String,
    /// Identity (or registry id) of the target agent.
    pub target_agent_id: String,
    /// Operation name forwarded to the target.
    pub operation: String,
    /// Invocation payload, forwarded verbatim.
    #[serde(default)]
    pub payload: Value,
    /// Correlation id; assigned by the router when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

/// Terminal reply status shared by the governed surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Authorized, dispatched, masked, audited.
    Success,
    /// Policy rejected the request.
    Denied,
    /// The request failed before producing a business-level result.
    Error,
}

/// Audit summary attached to successful governed replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyAudit {
    /// Field paths masked in `data`.
    pub fields_masked: Vec<String>,
    /// Policy version that authorized the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    /// When the audit row was written.
    pub timestamp: DateTime<Utc>,
}

/// Reply sent for `mesh.routing.kb_query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernedReply {
    /// Terminal status.
    pub status: ReplyStatus,
    /// Masked backend payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error description when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error code when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// Policy reason when `status` is `denied`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Echoed correlation id.
    pub request_id: RequestId,
    /// Audit summary, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<ReplyAudit>,
}

impl GovernedReply {
    /// Builds a success reply.
    #[must_use]
    pub fn success(request_id: RequestId, data: Value, audit: ReplyAudit) -> Self {
        Self {
            status: ReplyStatus::Success,
            data: Some(data),
            error: None,
            code: None,
            reason: None,
            request_id,
            audit: Some(audit),
        }
    }

    /// Builds a structured denial.
    #[must_use]
    pub fn denied(request_id: RequestId, reason: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Denied,
            data: None,
            error: None,
            code: Some(ErrorCode::Denied),
            reason: Some(reason.into()),
            request_id,
            audit: None,
        }
    }

    /// Builds an error reply.
    #[must_use]
    pub fn error(request_id: RequestId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            data: None,
            error: Some(message.into()),
            code: Some(code),
            reason: None,
            request_id,
            audit: None,
        }
    }
}

/// Reply sent for `mesh.routing.agent_invoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInvokeReply {
    /// Terminal status of the request itself.
    pub status: ReplyStatus,
    /// Correlation id for the invocation lifecycle, present unless the
    /// request was rejected before dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<TrackingId>,
    /// Terminal invocation state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<InvocationState>,
    /// Error description when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error code when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// Policy reason when `status` is `denied`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Echoed correlation id.
    pub request_id: RequestId,
}

/// Terminal invocation notification published on
/// `mesh.routing.completion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    /// Lifecycle correlation id.
    pub tracking_id: TrackingId,
    /// Invoking agent.
    pub source_agent_id: String,
    /// Target agent.
    pub target_agent_id: String,
    /// Terminal state reached.
    pub state: InvocationState,
    /// Masked target response, when the invocation completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error description when the invocation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the terminal state was reached.
    pub timestamp: DateTime<Utc>,
}

/// Request received on `mesh.audit.query` (ISO-8601 time bounds).
pub type AuditQueryRequest = AuditFilter;

/// Reply sent for `mesh.audit.query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditQueryReply {
    /// Matching rows, newest first.
    pub audit_logs: Vec<AuditEvent>,
    /// Match count before the limit was applied.
    pub total_count: usize,
    /// Echo of the filters that were actually set.
    pub filters_applied: Value,
}

/// Reply sent for `mesh.health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReply {
    /// `healthy` when every component responds, `degraded` otherwise.
    pub status: String,
    /// Per-component state.
    pub components: Value,
}

/// Error payload used by the non-governed request subjects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: ErrorCode,
}

impl ErrorReply {
    /// Builds an error reply.
    #[must_use]
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}
