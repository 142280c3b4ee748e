//! Decision input and output schemas.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input document submitted for every policy decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionInput {
    /// Kind of the requesting principal (`agent`).
    pub principal_type: String,
    /// Identity of the requesting principal.
    pub principal_id: String,
    /// Kind of the targeted resource (`kb` or `agent`).
    pub resource_type: String,
    /// Identifier of the targeted resource.
    pub resource_id: String,
    /// Operation being requested.
    pub action: String,
    /// Optional request context forwarded verbatim to the evaluator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl DecisionInput {
    /// Builds the input for a governed knowledge-base query.
    #[must_use]
    pub fn kb_query(
        principal_id: impl Into<String>,
        kb_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            principal_type: "agent".to_owned(),
            principal_id: principal_id.into(),
            resource_type: "kb".to_owned(),
            resource_id: kb_id.into(),
            action: action.into(),
            context: None,
        }
    }

    /// Builds the input for a governed agent invocation.
    #[must_use]
    pub fn agent_invoke(
        principal_id: impl Into<String>,
        target_agent_id: impl Into<String>,
    ) -> Self {
        Self {
            principal_type: "agent".to_owned(),
            principal_id: principal_id.into(),
            resource_type: "agent".to_owned(),
            resource_id: target_agent_id.into(),
            action: "invoke".to_owned(),
            context: None,
        }
    }

    /// Attaches request context.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Returns a stable fingerprint of the full input, used as the decision
    /// cache key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{}:{}:{}:{}:{}",
                self.principal_type,
                self.principal_id,
                self.resource_type,
                self.resource_id,
                self.action
            )
        })
    }
}

/// Structured decision returned by every evaluator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    allow: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    masking_rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    policy_version: Option<String>,
}

impl PolicyDecision {
    /// Returns an allow decision with no masking.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allow: true,
            masking_rules: Vec::new(),
            reason: None,
            policy_version: None,
        }
    }

    /// Returns a deny decision with an explanatory reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            masking_rules: Vec::new(),
            reason: Some(reason.into()),
            policy_version: None,
        }
    }

    /// Attaches masking rules (field paths redacted from replies).
    #[must_use]
    pub fn with_masking_rules(mut self, rules: Vec<String>) -> Self {
        self.masking_rules = rules;
        self
    }

    /// Attaches an explanatory reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the evaluator's policy version.
    #[must_use]
    pub fn with_policy_version(mut self, version: impl Into<String>) -> Self {
        self.policy_version = Some(version.into());
        self
    }

    /// Returns `true` when the request may proceed.
    #[must_use]
    pub const fn is_allow(&self) -> bool {
        self.allow
    }

    /// Returns the field paths that must be masked in the reply.
    #[must_use]
    pub fn masking_rules(&self) -> &[String] {
        &self.masking_rules
    }

    /// Returns the optional explanatory reason.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns the policy version pinned on audit rows.
    #[must_use]
    pub fn policy_version(&self) -> Option<&str> {
        self.policy_version.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_helpers_work() {
        let allow = PolicyDecision::allow().with_masking_rules(vec!["customer_email".into()]);
        assert!(allow.is_allow());
        assert_eq!(allow.masking_rules(), ["customer_email"]);

        let deny = PolicyDecision::deny("write access is not granted");
        assert!(!deny.is_allow());
        assert_eq!(deny.reason(), Some("write access is not granted"));
    }

    #[test]
    fn fingerprint_distinguishes_inputs() {
        let a = DecisionInput::kb_query("agent-1", "kb-1", "sql_query");
        let b = DecisionInput::kb_query("agent-1", "kb-1", "execute_sql");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn decision_round_trips_through_json() {
        let decision = PolicyDecision::allow()
            .with_masking_rules(vec!["ssn".into()])
            .with_policy_version("42");
        let json = serde_json::to_string(&decision).unwrap();
        let parsed: PolicyDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, decision);
    }
}
