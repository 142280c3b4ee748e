//! In-memory store backend.
//!
//! Default backend for tests and single-process deployments. A single
//! `RwLock` over the table map gives the serialization the audit table
//! needs; registry reads take the same lock, which is stricter than the
//! read-committed floor the contract asks for.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mesh_primitives::{
    AgentId, AgentRecord, AuditEvent, AuditFilter, KbId, KbRecord, PolicyId, PolicyRecord,
    ResourceStatus,
};
use tokio::sync::RwLock;

use crate::traits::{AgentFilter, AuditStore, KbFilter, PolicyStore, RegistryStore};
use crate::{StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    agents: HashMap<AgentId, AgentRecord>,
    identities: HashMap<String, AgentId>,
    kbs: HashMap<String, KbRecord>,
    policies: BTreeMap<String, PolicyRecord>,
    audit: Vec<AuditEvent>,
}

/// Process-local store keeping every table in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn insert_agent(&self, record: &AgentRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.identities.contains_key(record.identity()) {
            return Err(StoreError::Duplicate {
                kind: "agent",
                id: record.identity().to_owned(),
            });
        }
        inner
            .identities
            .insert(record.identity().to_owned(), record.agent_id());
        inner.agents.insert(record.agent_id(), record.clone());
        Ok(())
    }

    async fn get_agent(&self, agent_id: AgentId) -> StoreResult<Option<AgentRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.agents.get(&agent_id).cloned())
    }

    async fn get_agent_by_identity(&self, identity: &str) -> StoreResult<Option<AgentRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .identities
            .get(identity)
            .and_then(|id| inner.agents.get(id))
            .cloned())
    }

    async fn list_agents(&self, filter: &AgentFilter) -> StoreResult<(Vec<AgentRecord>, usize)> {
        let inner = self.inner.read().await;
        let mut rows: Vec<AgentRecord> = inner
            .agents
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        rows.sort_by_key(AgentRecord::registered_at);
        let total = rows.len();
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok((rows, total))
    }

    async fn update_agent_status(
        &self,
        agent_id: AgentId,
        status: ResourceStatus,
    ) -> StoreResult<AgentRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .agents
            .get(&agent_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            })?
            .with_status(status);
        inner.agents.insert(agent_id, record.clone());
        Ok(record)
    }

    async fn update_agent_capabilities(
        &self,
        agent_id: AgentId,
        capabilities: Vec<String>,
    ) -> StoreResult<AgentRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .agents
            .get(&agent_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            })?
            .with_capabilities(capabilities);
        inner.agents.insert(agent_id, record.clone());
        Ok(record)
    }

    async fn record_heartbeat(&self, agent_id: AgentId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .agents
            .get(&agent_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            })?
            .with_heartbeat(at);
        inner.agents.insert(agent_id, record);
        Ok(())
    }

    async fn delete_agent(&self, agent_id: AgentId) -> StoreResult<AgentRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .agents
            .remove(&agent_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            })?;
        inner.identities.remove(record.identity());
        Ok(record)
    }

    async fn insert_kb(&self, record: &KbRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = record.kb_id().as_str().to_owned();
        if inner.kbs.contains_key(&key) {
            return Err(StoreError::Duplicate {
                kind: "kb",
                id: key,
            });
        }
        inner.kbs.insert(key, record.clone());
        Ok(())
    }

    async fn get_kb(&self, kb_id: &KbId) -> StoreResult<Option<KbRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.kbs.get(kb_id.as_str()).cloned())
    }

    async fn list_kbs(&self, filter: &KbFilter) -> StoreResult<(Vec<KbRecord>, usize)> {
        let inner = self.inner.read().await;
        let mut rows: Vec<KbRecord> = inner
            .kbs
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        rows.sort_by_key(KbRecord::registered_at);
        let total = rows.len();
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok((rows, total))
    }

    async fn update_kb_status(
        &self,
        kb_id: &KbId,
        status: ResourceStatus,
    ) -> StoreResult<KbRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .kbs
            .get(kb_id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "kb",
                id: kb_id.to_string(),
            })?
            .with_status(status);
        inner.kbs.insert(kb_id.as_str().to_owned(), record.clone());
        Ok(record)
    }

    async fn record_kb_health_check(&self, kb_id: &KbId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .kbs
            .get(kb_id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "kb",
                id: kb_id.to_string(),
            })?
            .with_health_check(at);
        inner.kbs.insert(kb_id.as_str().to_owned(), record);
        Ok(())
    }

    async fn delete_kb(&self, kb_id: &KbId) -> StoreResult<KbRecord> {
        let mut inner = self.inner.write().await;
        inner
            .kbs
            .remove(kb_id.as_str())
            .ok_or_else(|| StoreError::NotFound {
                kind: "kb",
                id: kb_id.to_string(),
            })
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn upsert_policy(&self, record: &PolicyRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .policies
            .insert(record.policy_id().as_str().to_owned(), record.clone());
        Ok(())
    }

    async fn get_policy(&self, policy_id: &PolicyId) -> StoreResult<Option<PolicyRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.policies.get(policy_id.as_str()).cloned())
    }

    async fn list_policies(&self) -> StoreResult<Vec<PolicyRecord>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<PolicyRecord> = inner.policies.values().cloned().collect();
        rows.sort_by_key(|record| std::cmp::Reverse(record.precedence()));
        Ok(rows)
    }

    async fn delete_policy(&self, policy_id: &PolicyId) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.policies.remove(policy_id.as_str()).is_some())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.audit.push(event.clone());
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> StoreResult<(Vec<AuditEvent>, usize)> {
        let inner = self.inner.read().await;
        let mut rows: Vec<AuditEvent> = inner
            .audit
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        rows.sort_by_key(|event| std::cmp::Reverse(event.timestamp()));
        let total = rows.len();
        rows.truncate(filter.effective_limit());
        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_primitives::{AuditEventType, AuditOutcome, KbType};

    fn agent(identity: &str) -> AgentRecord {
        AgentRecord::builder(identity)
            .version("1.0.0")
            .capabilities(vec!["analytics".into()])
            .operations(vec!["query".into()])
            .health_endpoint("http://localhost:9000/health")
            .build()
            .unwrap()
    }

    fn kb(id: &str) -> KbRecord {
        KbRecord::builder(KbId::new(id).unwrap(), KbType::Postgres)
            .endpoint("postgresql://db:5432/sales")
            .operations(vec!["sql_query".into()])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_identity_is_rejected() {
        let store = MemoryStore::new();
        store.insert_agent(&agent("sales-agent-1")).await.unwrap();
        let err = store.insert_agent(&agent("sales-agent-1")).await.unwrap_err();
        assert!(err.is_duplicate());

        let (rows, total) = store.list_agents(&AgentFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn duplicate_kb_id_is_rejected() {
        let store = MemoryStore::new();
        store.insert_kb(&kb("sales-kb-1")).await.unwrap();
        assert!(store.insert_kb(&kb("sales-kb-1")).await.unwrap_err().is_duplicate());
    }

    #[tokio::test]
    async fn status_update_round_trips() {
        let store = MemoryStore::new();
        let record = agent("ops-agent");
        store.insert_agent(&record).await.unwrap();

        let updated = store
            .update_agent_status(record.agent_id(), ResourceStatus::Degraded)
            .await
            .unwrap();
        assert_eq!(updated.status(), ResourceStatus::Degraded);

        let fetched = store.get_agent(record.agent_id()).await.unwrap().unwrap();
        assert_eq!(fetched.status(), ResourceStatus::Degraded);
    }

    #[tokio::test]
    async fn capability_filter_applies() {
        let store = MemoryStore::new();
        store.insert_agent(&agent("a1")).await.unwrap();
        let other = AgentRecord::builder("a2")
            .version("1.0.0")
            .capabilities(vec!["search".into()])
            .operations(vec!["query".into()])
            .health_endpoint("http://localhost:9001/health")
            .build()
            .unwrap();
        store.insert_agent(&other).await.unwrap();

        let filter = AgentFilter {
            capability: Some("search".into()),
            ..AgentFilter::default()
        };
        let (rows, total) = store.list_agents(&filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].identity(), "a2");
    }

    #[tokio::test]
    async fn audit_query_respects_limit_and_total() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let event = AuditEvent::builder(
                AuditEventType::Query,
                format!("agent-{i}"),
                AuditOutcome::Success,
            )
            .build();
            store.append(&event).await.unwrap();
        }

        let filter = AuditFilter {
            limit: Some(2),
            ..AuditFilter::default()
        };
        let (rows, total) = store.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(total, 5);

        let zero = AuditFilter {
            limit: Some(0),
            ..AuditFilter::default()
        };
        let (rows, total) = store.query(&zero).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn policies_list_by_descending_precedence() {
        let store = MemoryStore::new();
        for (id, precedence) in [("low", 1), ("high", 10)] {
            let record = PolicyRecord::new(
                PolicyId::new(id).unwrap(),
                "package mesh\nallow := false",
            )
            .unwrap()
            .with_precedence(precedence);
            store.upsert_policy(&record).await.unwrap();
        }
        let rows = store.list_policies().await.unwrap();
        assert_eq!(rows[0].policy_id().as_str(), "high");
        assert!(store.delete_policy(&PolicyId::new("low").unwrap()).await.unwrap());
        assert!(!store.delete_policy(&PolicyId::new("low").unwrap()).await.unwrap());
    }
}
