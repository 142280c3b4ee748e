//! Policy document records persisted by the policy admin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, PolicyId};

/// A stored policy document, mirrored on disk as `{policy_id}.rego`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyRecord {
    policy_id: PolicyId,
    body: String,
    precedence: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    metadata: Value,
}

impl PolicyRecord {
    /// Creates a new active record with the supplied body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] when the body is empty.
    pub fn new(policy_id: PolicyId, body: impl Into<String>) -> crate::Result<Self> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(Error::invalid_record("policy body cannot be empty"));
        }
        let now = Utc::now();
        Ok(Self {
            policy_id,
            body,
            precedence: 0,
            active: true,
            created_at: now,
            updated_at: now,
            metadata: Value::Null,
        })
    }

    /// Returns the policy identifier.
    #[must_use]
    pub const fn policy_id(&self) -> &PolicyId {
        &self.policy_id
    }

    /// Returns the policy-language source text.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Returns the precedence used to order overlapping policies.
    #[must_use]
    pub const fn precedence(&self) -> i32 {
        self.precedence
    }

    /// Returns whether the policy participates in evaluation.
    #[must_use]
    pub const fn active(&self) -> bool {
        self.active
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last-update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns caller-supplied metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Sets the precedence.
    #[must_use]
    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    /// Enables or disables the policy.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replaces the body and stamps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] when the new body is empty.
    pub fn update_body(mut self, body: impl Into<String>) -> crate::Result<Self> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(Error::invalid_record("policy body cannot be empty"));
        }
        self.body = body;
        self.updated_at = Utc::now();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_body() {
        let id = PolicyId::new("kb-access").unwrap();
        assert!(PolicyRecord::new(id, "   ").is_err());
    }

    #[test]
    fn update_advances_timestamp() {
        let id = PolicyId::new("kb-access").unwrap();
        let record = PolicyRecord::new(id, "package mesh\nallow := true").unwrap();
        let created = record.created_at();
        let updated = record.update_body("package mesh\nallow := false").unwrap();
        assert!(updated.updated_at() >= created);
        assert!(updated.body().contains("false"));
    }
}
