//! Rule-based, in-process policy evaluator.
//!
//! Policy bodies for this evaluator are JSON rule documents rather than
//! Rego. The evaluation contract matches the external evaluator: default
//! deny, deny overrides allow, and the masking rules of every matching
//! allow rule are unioned into the decision.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use mesh_primitives::{PolicyId, PolicyRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decision::{DecisionInput, PolicyDecision};
use crate::evaluator::{PolicyError, PolicyEvaluator, PolicyResult};

/// Whether a matching rule grants or rejects the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleEffect {
    /// Grant the request.
    Allow,
    /// Reject the request. Deny always wins over allow.
    Deny,
}

/// One rule inside a [`RuleDocument`]. Absent fields match anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Effect applied when the rule matches.
    pub effect: RuleEffect,
    /// Principal identity to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    /// Resource kind to match (`kb` or `agent`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Resource identifier to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Operation to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Field paths masked when this allow rule contributes to the decision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masking_rules: Vec<String>,
    /// Explanation propagated into the decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PolicyRule {
    fn matches(&self, input: &DecisionInput) -> bool {
        self.principal_id
            .as_deref()
            .is_none_or(|p| p == input.principal_id)
            && self
                .resource_type
                .as_deref()
                .is_none_or(|r| r == input.resource_type)
            && self
                .resource_id
                .as_deref()
                .is_none_or(|r| r == input.resource_id)
            && self.action.as_deref().is_none_or(|a| a == input.action)
    }
}

/// Parsed policy body accepted by the rule-based evaluator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDocument {
    /// Rules evaluated in precedence order across documents.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

struct InstalledPolicy {
    precedence: i32,
    active: bool,
    document: RuleDocument,
}

/// In-process evaluator over JSON rule documents.
///
/// Used by the test suites and by deployments that run without an external
/// evaluator. `policy_version` on decisions is the evaluator revision,
/// which advances on every install or removal.
#[derive(Default)]
pub struct RuleBasedEvaluator {
    policies: RwLock<HashMap<String, InstalledPolicy>>,
    revision: AtomicU64,
}

impl RuleBasedEvaluator {
    /// Creates an empty evaluator (denies everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(&self) -> String {
        self.revision.load(Ordering::Acquire).to_string()
    }
}

impl std::fmt::Debug for RuleBasedEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleBasedEvaluator")
            .field("revision", &self.revision.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PolicyEvaluator for RuleBasedEvaluator {
    async fn evaluate(&self, input: &DecisionInput) -> PolicyResult<PolicyDecision> {
        let guard = self.policies.read().expect("policy table poisoned");
        let mut installed: Vec<&InstalledPolicy> =
            guard.values().filter(|p| p.active).collect();
        installed.sort_by_key(|p| std::cmp::Reverse(p.precedence));

        let mut masking_rules: Vec<String> = Vec::new();
        let mut allow_reason: Option<String> = None;
        let mut allowed = false;

        for policy in installed {
            for rule in &policy.document.rules {
                if !rule.matches(input) {
                    continue;
                }
                match rule.effect {
                    RuleEffect::Deny => {
                        debug!(
                            principal = %input.principal_id,
                            resource = %input.resource_id,
                            action = %input.action,
                            "deny rule matched"
                        );
                        return Ok(PolicyDecision::deny(
                            rule.reason
                                .clone()
                                .unwrap_or_else(|| "denied by policy".to_owned()),
                        )
                        .with_policy_version(self.current_version()));
                    }
                    RuleEffect::Allow => {
                        allowed = true;
                        if allow_reason.is_none() {
                            allow_reason.clone_from(&rule.reason);
                        }
                        for path in &rule.masking_rules {
                            if !masking_rules.contains(path) {
                                masking_rules.push(path.clone());
                            }
                        }
                    }
                }
            }
        }

        if allowed {
            let mut decision = PolicyDecision::allow()
                .with_masking_rules(masking_rules)
                .with_policy_version(self.current_version());
            if let Some(reason) = allow_reason {
                decision = decision.with_reason(reason);
            }
            return Ok(decision);
        }

        Ok(PolicyDecision::deny(format!(
            "no policy allows `{}` on {} `{}`",
            input.action, input.resource_type, input.resource_id
        ))
        .with_policy_version(self.current_version()))
    }

    async fn install_policy(&self, record: &PolicyRecord) -> PolicyResult<()> {
        let document: RuleDocument = serde_json::from_str(record.body())
            .map_err(|err| PolicyError::invalid_policy(record.policy_id(), err.to_string()))?;
        let mut guard = self.policies.write().expect("policy table poisoned");
        guard.insert(
            record.policy_id().to_string(),
            InstalledPolicy {
                precedence: record.precedence(),
                active: record.active(),
                document,
            },
        );
        drop(guard);
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn remove_policy(&self, policy_id: &PolicyId) -> PolicyResult<()> {
        let mut guard = self.policies.write().expect("policy table poisoned");
        guard.remove(policy_id.as_str());
        drop(guard);
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
