//! Wire-level structures for the registry subjects.

use chrono::{DateTime, Utc};
use mesh_primitives::{AgentId, AgentRecord, KbId, KbRecord, KbType, ResourceStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Registration payload received on `mesh.registry.agent.register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentRequest {
    /// Caller-chosen unique identity.
    pub identity: String,
    /// Semantic version advertised by the agent.
    pub version: String,
    /// Capability labels, insertion-ordered.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Operations from the agent vocabulary.
    #[serde(default)]
    pub operations: Vec<String>,
    /// HTTP endpoint probed by the health monitor.
    pub health_endpoint: String,
    /// Opaque caller metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Successful agent registration acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentReply {
    /// Registry-assigned identifier.
    pub agent_id: AgentId,
    /// Echoed identity.
    pub identity: String,
    /// Echoed version.
    pub version: String,
    /// Initial status.
    pub status: ResourceStatus,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
}

impl RegisterAgentReply {
    /// Builds the reply from a committed record.
    #[must_use]
    pub fn from_record(record: &AgentRecord) -> Self {
        Self {
            agent_id: record.agent_id(),
            identity: record.identity().to_owned(),
            version: record.version().to_owned(),
            status: record.status(),
            registered_at: record.registered_at(),
        }
    }
}

/// Registration payload received on `mesh.registry.kb.register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterKbRequest {
    /// Caller-chosen unique knowledge-base id.
    pub kb_id: String,
    /// Backend type.
    pub kb_type: KbType,
    /// Backend driver URI.
    pub endpoint: String,
    /// Operations from the backend vocabulary.
    #[serde(default)]
    pub operations: Vec<String>,
    /// Opaque schema description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_schema: Option<Value>,
    /// Opaque credentials, stored but never served back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
    /// Opaque caller metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Successful knowledge-base registration acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterKbReply {
    /// Echoed knowledge-base id.
    pub kb_id: KbId,
    /// Status after the initial connectivity probe.
    pub status: ResourceStatus,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
}

impl RegisterKbReply {
    /// Builds the reply from a committed record.
    #[must_use]
    pub fn from_record(record: &KbRecord) -> Self {
        Self {
            kb_id: record.kb_id().clone(),
            status: record.status(),
            registered_at: record.registered_at(),
        }
    }
}

/// Heartbeat payload received on `mesh.registry.agent.heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Identifier of the agent sending the heartbeat.
    pub agent_id: AgentId,
}

/// Heartbeat acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReply {
    /// Whether the heartbeat was recorded.
    pub success: bool,
    /// Echoed agent identifier.
    pub agent_id: AgentId,
    /// Registry timestamp recorded for the heartbeat.
    pub timestamp: DateTime<Utc>,
}

/// Deregistration payload for agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeregisterAgentRequest {
    /// Identifier of the agent to remove.
    pub agent_id: AgentId,
}

/// Deregistration payload for knowledge bases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeregisterKbRequest {
    /// Identifier of the knowledge base to remove.
    pub kb_id: String,
}

/// Generic acknowledgement for deregistrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeregisterReply {
    /// Whether a row was removed.
    pub success: bool,
}
