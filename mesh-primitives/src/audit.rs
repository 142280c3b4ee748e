//! Append-only audit event model.
//!
//! Events are write-once values: the builder is the only way to set fields
//! and no mutating accessors exist, so a stored event can never change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Category of a governed operation recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Agent or knowledge-base registration.
    Register,
    /// Governed knowledge-base query.
    Query,
    /// Governed agent-to-agent invocation.
    Invoke,
    /// Standalone policy decision recorded outside a query or invoke flow.
    PolicyDecision,
}

impl AuditEventType {
    /// Returns the wire representation of the event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Query => "query",
            Self::Invoke => "invoke",
            Self::PolicyDecision => "policy_decision",
        }
    }
}

/// Terminal outcome of a governed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// The operation completed and a (possibly masked) reply was sent.
    Success,
    /// Policy evaluation rejected the operation.
    Denied,
    /// The operation failed before producing a business-level reply.
    Error,
}

impl AuditOutcome {
    /// Returns the wire representation of the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Denied => "denied",
            Self::Error => "error",
        }
    }
}

/// One immutable row in the audit log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    id: Uuid,
    event_type: AuditEventType,
    source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_id: Option<String>,
    outcome: AuditOutcome,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    policy_decision: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    masked_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    full_request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    full_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    provenance_chain: Vec<String>,
}

impl AuditEvent {
    /// Starts building an event for the supplied type, source, and outcome.
    #[must_use]
    pub fn builder(
        event_type: AuditEventType,
        source_id: impl Into<String>,
        outcome: AuditOutcome,
    ) -> AuditEventBuilder {
        AuditEventBuilder {
            event_type,
            source_id: source_id.into(),
            target_id: None,
            outcome,
            request_metadata: None,
            policy_decision: None,
            masked_fields: Vec::new(),
            full_request: None,
            full_response: None,
            provenance_chain: Vec::new(),
        }
    }

    /// Returns the event identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the event type.
    #[must_use]
    pub const fn event_type(&self) -> AuditEventType {
        self.event_type
    }

    /// Returns the principal that initiated the operation.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Returns the resource the operation targeted, if any.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    /// Returns the terminal outcome.
    #[must_use]
    pub const fn outcome(&self) -> AuditOutcome {
        self.outcome
    }

    /// Returns the time the event was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns request metadata captured alongside the event.
    #[must_use]
    pub const fn request_metadata(&self) -> Option<&Value> {
        self.request_metadata.as_ref()
    }

    /// Returns the serialized policy decision, when one was made.
    #[must_use]
    pub const fn policy_decision(&self) -> Option<&Value> {
        self.policy_decision.as_ref()
    }

    /// Returns the field paths masked in the reply.
    #[must_use]
    pub fn masked_fields(&self) -> &[String] {
        &self.masked_fields
    }

    /// Returns the heavy-logged request payload, when enabled.
    #[must_use]
    pub const fn full_request(&self) -> Option<&Value> {
        self.full_request.as_ref()
    }

    /// Returns the heavy-logged (masked) response payload, when enabled.
    #[must_use]
    pub const fn full_response(&self) -> Option<&Value> {
        self.full_response.as_ref()
    }

    /// Returns the provenance chain for multi-hop invocations.
    #[must_use]
    pub fn provenance_chain(&self) -> &[String] {
        &self.provenance_chain
    }
}

/// Builder for [`AuditEvent`].
#[derive(Debug)]
pub struct AuditEventBuilder {
    event_type: AuditEventType,
    source_id: String,
    target_id: Option<String>,
    outcome: AuditOutcome,
    request_metadata: Option<Value>,
    policy_decision: Option<Value>,
    masked_fields: Vec<String>,
    full_request: Option<Value>,
    full_response: Option<Value>,
    provenance_chain: Vec<String>,
}

impl AuditEventBuilder {
    /// Sets the targeted resource id.
    #[must_use]
    pub fn target_id(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Attaches request metadata (operation name, request id, and the like).
    #[must_use]
    pub fn request_metadata(mut self, metadata: Value) -> Self {
        self.request_metadata = Some(metadata);
        self
    }

    /// Attaches the serialized policy decision.
    #[must_use]
    pub fn policy_decision(mut self, decision: Value) -> Self {
        self.policy_decision = Some(decision);
        self
    }

    /// Records the masked field paths.
    #[must_use]
    pub fn masked_fields(mut self, fields: Vec<String>) -> Self {
        self.masked_fields = fields;
        self
    }

    /// Attaches the heavy-logged request payload.
    #[must_use]
    pub fn full_request(mut self, request: Value) -> Self {
        self.full_request = Some(request);
        self
    }

    /// Attaches the heavy-logged response payload. Callers must mask the
    /// payload before attaching it; the audit store never sees cleartext for
    /// masked fields.
    #[must_use]
    pub fn full_response(mut self, response: Value) -> Self {
        self.full_response = Some(response);
        self
    }

    /// Appends a hop to the provenance chain.
    #[must_use]
    pub fn provenance(mut self, hop: impl Into<String>) -> Self {
        self.provenance_chain.push(hop.into());
        self
    }

    /// Stamps id and timestamp and produces the immutable event.
    #[must_use]
    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            event_type: self.event_type,
            source_id: self.source_id,
            target_id: self.target_id,
            outcome: self.outcome,
            timestamp: Utc::now(),
            request_metadata: self.request_metadata,
            policy_decision: self.policy_decision,
            masked_fields: self.masked_fields,
            full_request: self.full_request,
            full_response: self.full_response,
            provenance_chain: self.provenance_chain,
        }
    }
}

/// Structured filter accepted by the audit query surface.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Restrict to a single event type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<AuditEventType>,
    /// Restrict to events initiated by this principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Restrict to events targeting this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Restrict to a single outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AuditOutcome>,
    /// Inclusive lower bound on the event timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the event timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Maximum number of rows to return; defaults to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Default row cap applied when a filter omits `limit`.
pub const DEFAULT_AUDIT_LIMIT: usize = 100;

impl AuditFilter {
    /// Returns the effective row cap.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_AUDIT_LIMIT)
    }

    /// Returns `true` when the event satisfies every set field.
    ///
    /// An inverted time range (`start_time > end_time`) matches nothing.
    #[must_use]
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return false;
            }
        }
        if self.event_type.is_some_and(|t| t != event.event_type()) {
            return false;
        }
        if self
            .source_id
            .as_deref()
            .is_some_and(|s| s != event.source_id())
        {
            return false;
        }
        if self
            .target_id
            .as_deref()
            .is_some_and(|t| Some(t) != event.target_id())
        {
            return false;
        }
        if self.outcome.is_some_and(|o| o != event.outcome()) {
            return false;
        }
        if self.start_time.is_some_and(|s| event.timestamp() < s) {
            return false;
        }
        if self.end_time.is_some_and(|e| event.timestamp() > e) {
            return false;
        }
        true
    }

    /// Returns the subset of fields that were actually set, for the
    /// `filters_applied` echo in query replies.
    #[must_use]
    pub fn applied(&self) -> Value {
        let mut applied = serde_json::Map::new();
        if let Some(t) = self.event_type {
            applied.insert("event_type".into(), t.as_str().into());
        }
        if let Some(s) = &self.source_id {
            applied.insert("source_id".into(), s.clone().into());
        }
        if let Some(t) = &self.target_id {
            applied.insert("target_id".into(), t.clone().into());
        }
        if let Some(o) = self.outcome {
            applied.insert("outcome".into(), o.as_str().into());
        }
        if let Some(s) = self.start_time {
            applied.insert("start_time".into(), s.to_rfc3339().into());
        }
        if let Some(e) = self.end_time {
            applied.insert("end_time".into(), e.to_rfc3339().into());
        }
        if let Some(l) = self.limit {
            applied.insert("limit".into(), l.into());
        }
        Value::Object(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event() -> AuditEvent {
        AuditEvent::builder(AuditEventType::Query, "marketing-agent-2", AuditOutcome::Success)
            .target_id("sales-kb-1")
            .masked_fields(vec!["customer_email".into()])
            .build()
    }

    #[test]
    fn filter_matches_on_all_set_fields() {
        let event = event();
        let filter = AuditFilter {
            event_type: Some(AuditEventType::Query),
            source_id: Some("marketing-agent-2".into()),
            target_id: Some("sales-kb-1".into()),
            outcome: Some(AuditOutcome::Success),
            ..AuditFilter::default()
        };
        assert!(filter.matches(&event));

        let filter = AuditFilter {
            outcome: Some(AuditOutcome::Denied),
            ..AuditFilter::default()
        };
        assert!(!filter.matches(&event));
    }

    #[test]
    fn inverted_time_range_matches_nothing() {
        let event = event();
        let filter = AuditFilter {
            start_time: Some(event.timestamp() + Duration::hours(1)),
            end_time: Some(event.timestamp() - Duration::hours(1)),
            ..AuditFilter::default()
        };
        assert!(!filter.matches(&event));
    }

    #[test]
    fn applied_echoes_only_set_fields() {
        let filter = AuditFilter {
            source_id: Some("a".into()),
            limit: Some(5),
            ..AuditFilter::default()
        };
        let applied = filter.applied();
        assert_eq!(applied["source_id"], "a");
        assert_eq!(applied["limit"], 5);
        assert!(applied.get("outcome").is_none());
    }

    #[test]
    fn default_limit_is_one_hundred() {
        assert_eq!(AuditFilter::default().effective_limit(), 100);
        let filter = AuditFilter {
            limit: Some(0),
            ..AuditFilter::default()
        };
        assert_eq!(filter.effective_limit(), 0);
    }
}
