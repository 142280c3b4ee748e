//! Store traits shared by the in-memory and Postgres backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mesh_primitives::{
    AgentId, AgentRecord, AuditEvent, AuditFilter, KbId, KbRecord, KbType, PolicyId, PolicyRecord,
    ResourceStatus,
};

use crate::StoreResult;

/// Filter applied to agent listings.
#[derive(Clone, Debug, Default)]
pub struct AgentFilter {
    /// Restrict to agents with this exact identity.
    pub identity: Option<String>,
    /// Restrict to agents advertising this capability.
    pub capability: Option<String>,
    /// Restrict to agents in this status.
    pub status: Option<ResourceStatus>,
    /// Advisory row cap; `None` means the directory default applies upstream.
    pub limit: Option<usize>,
}

impl AgentFilter {
    /// Returns `true` when the record satisfies every set field.
    #[must_use]
    pub fn matches(&self, record: &AgentRecord) -> bool {
        if self
            .identity
            .as_deref()
            .is_some_and(|identity| identity != record.identity())
        {
            return false;
        }
        if self
            .capability
            .as_deref()
            .is_some_and(|capability| !record.capabilities().iter().any(|c| c == capability))
        {
            return false;
        }
        if self.status.is_some_and(|status| status != record.status()) {
            return false;
        }
        true
    }
}

/// Filter applied to knowledge-base listings.
#[derive(Clone, Debug, Default)]
pub struct KbFilter {
    /// Restrict to this backend type.
    pub kb_type: Option<KbType>,
    /// Restrict to knowledge bases in this status.
    pub status: Option<ResourceStatus>,
    /// Advisory row cap.
    pub limit: Option<usize>,
}

impl KbFilter {
    /// Returns `true` when the record satisfies every set field.
    #[must_use]
    pub fn matches(&self, record: &KbRecord) -> bool {
        if self.kb_type.is_some_and(|t| t != record.kb_type()) {
            return false;
        }
        if self.status.is_some_and(|status| status != record.status()) {
            return false;
        }
        true
    }
}

/// Registry rows: agents and knowledge bases.
///
/// Uniqueness of `identity` and `kb_id` is enforced here, at the row level.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Inserts a new agent row.
    ///
    /// Fails with [`crate::StoreError::Duplicate`] when the identity is taken.
    async fn insert_agent(&self, record: &AgentRecord) -> StoreResult<()>;

    /// Fetches an agent by its registry-assigned id.
    async fn get_agent(&self, agent_id: AgentId) -> StoreResult<Option<AgentRecord>>;

    /// Fetches an agent by its unique identity.
    async fn get_agent_by_identity(&self, identity: &str) -> StoreResult<Option<AgentRecord>>;

    /// Lists agents matching the filter, returning `(rows, total_count)`
    /// where `total_count` is the match count before the limit is applied.
    async fn list_agents(&self, filter: &AgentFilter) -> StoreResult<(Vec<AgentRecord>, usize)>;

    /// Updates an agent's status, returning the updated row.
    async fn update_agent_status(
        &self,
        agent_id: AgentId,
        status: ResourceStatus,
    ) -> StoreResult<AgentRecord>;

    /// Replaces an agent's capability set, returning the updated row.
    async fn update_agent_capabilities(
        &self,
        agent_id: AgentId,
        capabilities: Vec<String>,
    ) -> StoreResult<AgentRecord>;

    /// Records a heartbeat observation for an agent.
    async fn record_heartbeat(&self, agent_id: AgentId, at: DateTime<Utc>) -> StoreResult<()>;

    /// Removes an agent row, returning it.
    async fn delete_agent(&self, agent_id: AgentId) -> StoreResult<AgentRecord>;

    /// Inserts a new knowledge-base row.
    ///
    /// Fails with [`crate::StoreError::Duplicate`] when the kb id is taken.
    async fn insert_kb(&self, record: &KbRecord) -> StoreResult<()>;

    /// Fetches a knowledge base by id.
    async fn get_kb(&self, kb_id: &KbId) -> StoreResult<Option<KbRecord>>;

    /// Lists knowledge bases matching the filter, returning
    /// `(rows, total_count)`.
    async fn list_kbs(&self, filter: &KbFilter) -> StoreResult<(Vec<KbRecord>, usize)>;

    /// Updates a knowledge base's status, returning the updated row.
    async fn update_kb_status(
        &self,
        kb_id: &KbId,
        status: ResourceStatus,
    ) -> StoreResult<KbRecord>;

    /// Records a health-check observation for a knowledge base.
    async fn record_kb_health_check(&self, kb_id: &KbId, at: DateTime<Utc>) -> StoreResult<()>;

    /// Removes a knowledge-base row, returning it.
    async fn delete_kb(&self, kb_id: &KbId) -> StoreResult<KbRecord>;
}

/// Policy documents persisted for the admin surface.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Inserts or replaces a policy document (last writer wins).
    async fn upsert_policy(&self, record: &PolicyRecord) -> StoreResult<()>;

    /// Fetches a policy by id.
    async fn get_policy(&self, policy_id: &PolicyId) -> StoreResult<Option<PolicyRecord>>;

    /// Lists all stored policies, ordered by descending precedence.
    async fn list_policies(&self) -> StoreResult<Vec<PolicyRecord>>;

    /// Deletes a policy, returning whether a row was removed.
    async fn delete_policy(&self, policy_id: &PolicyId) -> StoreResult<bool>;
}

/// Append-only audit events.
///
/// There is deliberately no update or delete surface.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends one event.
    async fn append(&self, event: &AuditEvent) -> StoreResult<()>;

    /// Returns events matching the filter, newest first, as
    /// `(rows, total_count)` where `total_count` ignores the limit.
    async fn query(&self, filter: &AuditFilter) -> StoreResult<(Vec<AuditEvent>, usize)>;
}

/// Bundle trait for consumers that need the whole store.
pub trait MeshStore: RegistryStore + PolicyStore + AuditStore + Send + Sync {}

impl<T> MeshStore for T where T: RegistryStore + PolicyStore + AuditStore + Send + Sync {}
