//! Subject grammar used on the mesh.
//!
//! Subjects are dot-separated token lists. Subscriptions may use the NATS
//! wildcards: `*` matches exactly one token, `>` matches the remaining
//! tail and must be the final token.

use mesh_primitives::{AgentId, KbId};

/// Agent registration requests.
pub const AGENT_REGISTER: &str = "mesh.registry.agent.register";
/// Agent heartbeat notifications.
pub const AGENT_HEARTBEAT: &str = "mesh.registry.agent.heartbeat";
/// Agent deregistration requests.
pub const AGENT_DEREGISTER: &str = "mesh.registry.agent.deregister";
/// Knowledge-base registration requests.
pub const KB_REGISTER: &str = "mesh.registry.kb.register";
/// Knowledge-base deregistration requests.
pub const KB_DEREGISTER: &str = "mesh.registry.kb.deregister";
/// Filterable directory reads.
pub const DIRECTORY_QUERY: &str = "mesh.directory.query";
/// Directory change notifications (publish-only).
pub const DIRECTORY_UPDATES: &str = "mesh.directory.updates";
/// Audit-log queries.
pub const AUDIT_QUERY: &str = "mesh.audit.query";
/// Policy uploads (install + persist + mirror).
pub const POLICY_UPLOAD: &str = "mesh.policy.upload";
/// Stored-policy listings.
pub const POLICY_LIST: &str = "mesh.policy.list";
/// Single-policy reads.
pub const POLICY_GET: &str = "mesh.policy.get";
/// Policy removals.
pub const POLICY_DELETE: &str = "mesh.policy.delete";
/// Mesh self-health requests.
pub const HEALTH: &str = "mesh.health";
/// Governed knowledge-base queries.
pub const KB_QUERY: &str = "mesh.routing.kb_query";
/// Governed agent-to-agent invocations.
pub const AGENT_INVOKE: &str = "mesh.routing.agent_invoke";
/// Terminal invocation states (publish-only).
pub const ROUTING_COMPLETION: &str = "mesh.routing.completion";

/// Returns the adapter dispatch subject for a knowledge base.
#[must_use]
pub fn adapter_query(kb_id: &KbId) -> String {
    format!("{kb_id}.adapter.query")
}

/// Returns the direct-delivery subject for an agent.
#[must_use]
pub fn agent_inbox(agent_id: AgentId) -> String {
    format!("agent.{agent_id}")
}

/// Returns `true` when `subject` matches the subscription `pattern`.
#[must_use]
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (None, None) => return true,
            (Some(">"), _) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_subjects_match_exactly() {
        assert!(matches(KB_QUERY, "mesh.routing.kb_query"));
        assert!(!matches(KB_QUERY, "mesh.routing.agent_invoke"));
        assert!(!matches(KB_QUERY, "mesh.routing.kb_query.extra"));
    }

    #[test]
    fn star_matches_one_token() {
        assert!(matches("*.adapter.query", "sales-kb-1.adapter.query"));
        assert!(!matches("*.adapter.query", "a.b.adapter.query"));
        assert!(matches("mesh.registry.*.register", AGENT_REGISTER));
    }

    #[test]
    fn tail_wildcard_matches_rest() {
        assert!(matches("mesh.>", "mesh.routing.kb_query"));
        assert!(matches("mesh.>", "mesh.health"));
        assert!(!matches("mesh.>", "agent.123"));
    }

    #[test]
    fn builders_embed_ids() {
        let kb_id = KbId::new("sales-kb-1").unwrap();
        assert_eq!(adapter_query(&kb_id), "sales-kb-1.adapter.query");
        let agent_id = AgentId::random();
        assert_eq!(agent_inbox(agent_id), format!("agent.{agent_id}"));
    }
}
