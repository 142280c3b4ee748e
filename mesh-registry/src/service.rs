//! Registry service: validated writes with directory announcements.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use mesh_primitives::{
    AgentId, AgentRecord, AuditEvent, AuditEventType, AuditOutcome, KbId, KbRecord, ResourceStatus,
};
use mesh_store::{AuditStore, MeshStore, RegistryStore};
use mesh_transport::{Transport, subject};
use serde_json::json;
use tracing::{info, warn};

use crate::events::DirectoryEvent;
use crate::health::HealthProbe;
use crate::wire::{RegisterAgentRequest, RegisterKbRequest};
use crate::{RegistryError, RegistryResult};

/// Authoritative catalog of agents and knowledge bases.
///
/// Every accepted mutation writes its audit row before returning, and
/// announces itself on `mesh.directory.updates` strictly after the store
/// commit. A failed announcement is logged and never rolls the row back;
/// late subscribers resync through `mesh.directory.query`. A failed audit
/// write is different: the mutation is compensated (insert deleted, update
/// restored, fresh row removed) and the operation fails, so no mutation
/// survives without its audit row.
pub struct RegistryService {
    store: Arc<dyn MeshStore>,
    transport: Arc<dyn Transport>,
    probe: Option<Arc<dyn HealthProbe>>,
}

impl RegistryService {
    /// Creates a registry over the given store and transport.
    #[must_use]
    pub fn new(store: Arc<dyn MeshStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            probe: None,
        }
    }

    /// Enables the one-shot connectivity probe for knowledge-base
    /// registrations.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MeshStore> {
        &self.store
    }

    /// Registers an agent.
    ///
    /// # Errors
    ///
    /// `Validation` for bad fields or operations outside the agent
    /// vocabulary, `Duplicate` for a taken identity, `AuditFailure` when
    /// the audit row cannot be written.
    pub async fn register_agent(
        &self,
        request: RegisterAgentRequest,
    ) -> RegistryResult<AgentRecord> {
        let mut builder = AgentRecord::builder(request.identity)
            .version(request.version)
            .capabilities(request.capabilities)
            .operations(request.operations)
            .health_endpoint(request.health_endpoint);
        if let Some(metadata) = request.metadata {
            builder = builder.metadata(metadata);
        }
        let record = builder.build()?;

        self.store.insert_agent(&record).await?;

        let audit = AuditEvent::builder(
            AuditEventType::Register,
            record.identity(),
            AuditOutcome::Success,
        )
        .request_metadata(json!({
            "action": "register_agent",
            "agent_id": record.agent_id(),
            "version": record.version(),
        }))
        .build();
        if let Err(err) = self.store.append(&audit).await {
            warn!(identity = %record.identity(), ?err, "audit write failed; rolling back registration");
            let _ = self.store.delete_agent(record.agent_id()).await;
            return Err(RegistryError::AuditFailure {
                reason: err.to_string(),
            });
        }

        self.publish(DirectoryEvent::agent_registered(&record)).await;
        info!(identity = %record.identity(), agent_id = %record.agent_id(), "agent registered");
        Ok(record)
    }

    /// Registers a knowledge base.
    ///
    /// When a probe is configured, a one-shot connectivity handshake runs
    /// first: failure does not reject the registration, but the row is
    /// committed with status `offline`; success attaches the probe latency.
    ///
    /// # Errors
    ///
    /// `Validation` for bad fields or operations outside the backend
    /// vocabulary, `Duplicate` for a taken kb id, `AuditFailure` when the
    /// audit row cannot be written.
    pub async fn register_kb(&self, request: RegisterKbRequest) -> RegistryResult<KbRecord> {
        let kb_id = KbId::new(request.kb_id)?;
        let mut builder = KbRecord::builder(kb_id, request.kb_type)
            .endpoint(request.endpoint)
            .operations(request.operations);
        if let Some(schema) = request.kb_schema {
            builder = builder.schema(schema);
        }
        if let Some(credentials) = request.credentials {
            builder = builder.credentials(credentials);
        }
        if let Some(metadata) = request.metadata {
            builder = builder.metadata(metadata);
        }
        let mut record = builder.build()?;

        if let Some(probe) = &self.probe {
            match probe.probe_kb(&record).await {
                Ok(latency) => {
                    record = record
                        .with_probe_latency(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
                }
                Err(err) => {
                    warn!(kb_id = %record.kb_id(), %err, "initial connectivity probe failed");
                    record = record.with_status(ResourceStatus::Offline);
                }
            }
        }

        self.store.insert_kb(&record).await?;

        let audit = AuditEvent::builder(
            AuditEventType::Register,
            record.kb_id().as_str(),
            AuditOutcome::Success,
        )
        .request_metadata(json!({
            "action": "register_kb",
            "kb_type": record.kb_type(),
            "status": record.status(),
        }))
        .build();
        if let Err(err) = self.store.append(&audit).await {
            warn!(kb_id = %record.kb_id(), ?err, "audit write failed; rolling back registration");
            let _ = self.store.delete_kb(record.kb_id()).await;
            return Err(RegistryError::AuditFailure {
                reason: err.to_string(),
            });
        }

        self.publish(DirectoryEvent::kb_registered(&record)).await;
        info!(kb_id = %record.kb_id(), status = %record.status(), "knowledge base registered");
        Ok(record)
    }

    /// Records a heartbeat for an agent.
    ///
    /// # Errors
    ///
    /// `NotFound` when the agent is not registered.
    pub async fn heartbeat(&self, agent_id: AgentId) -> RegistryResult<DateTime<Utc>> {
        let now = Utc::now();
        self.store.record_heartbeat(agent_id, now).await?;
        Ok(now)
    }

    /// Fetches an agent by id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get_agent(&self, agent_id: AgentId) -> RegistryResult<Option<AgentRecord>> {
        Ok(self.store.get_agent(agent_id).await?)
    }

    /// Fetches an agent by identity.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get_agent_by_identity(
        &self,
        identity: &str,
    ) -> RegistryResult<Option<AgentRecord>> {
        Ok(self.store.get_agent_by_identity(identity).await?)
    }

    /// Fetches a knowledge base by id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get_kb(&self, kb_id: &KbId) -> RegistryResult<Option<KbRecord>> {
        Ok(self.store.get_kb(kb_id).await?)
    }

    /// Moves an agent to a new status, announcing and auditing the change.
    ///
    /// # Errors
    ///
    /// `NotFound` when the agent is not registered.
    pub async fn update_agent_status(
        &self,
        agent_id: AgentId,
        status: ResourceStatus,
    ) -> RegistryResult<AgentRecord> {
        let before = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            })?;
        if before.status() == status {
            return Ok(before);
        }
        let record = self.store.update_agent_status(agent_id, status).await?;

        if let Err(err) = self
            .audit_status_change(record.identity(), before.status(), status)
            .await
        {
            warn!(identity = %record.identity(), "audit write failed; restoring previous status");
            let _ = self.store.update_agent_status(agent_id, before.status()).await;
            return Err(err);
        }
        self.publish(DirectoryEvent::agent_status_changed(&record)).await;
        info!(identity = %record.identity(), from = %before.status(), to = %status, "agent status changed");
        Ok(record)
    }

    /// Moves a knowledge base to a new status, announcing and auditing the
    /// change.
    ///
    /// # Errors
    ///
    /// `NotFound` when the knowledge base is not registered.
    pub async fn update_kb_status(
        &self,
        kb_id: &KbId,
        status: ResourceStatus,
    ) -> RegistryResult<KbRecord> {
        let before = self
            .store
            .get_kb(kb_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound {
                kind: "kb",
                id: kb_id.to_string(),
            })?;
        if before.status() == status {
            return Ok(before);
        }
        let record = self.store.update_kb_status(kb_id, status).await?;

        if let Err(err) = self
            .audit_status_change(kb_id.as_str(), before.status(), status)
            .await
        {
            warn!(kb_id = %kb_id, "audit write failed; restoring previous status");
            let _ = self.store.update_kb_status(kb_id, before.status()).await;
            return Err(err);
        }
        self.publish(DirectoryEvent::kb_status_changed(&record)).await;
        info!(kb_id = %kb_id, from = %before.status(), to = %status, "kb status changed");
        Ok(record)
    }

    /// Records a health-check observation for a knowledge base.
    ///
    /// # Errors
    ///
    /// `NotFound` when the knowledge base is not registered.
    pub async fn record_kb_health_check(&self, kb_id: &KbId) -> RegistryResult<()> {
        Ok(self.store.record_kb_health_check(kb_id, Utc::now()).await?)
    }

    /// Replaces an agent's capability set.
    ///
    /// # Errors
    ///
    /// `NotFound` when the agent is not registered.
    pub async fn update_agent_capabilities(
        &self,
        agent_id: AgentId,
        capabilities: Vec<String>,
    ) -> RegistryResult<AgentRecord> {
        let before = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            })?;
        let record = self
            .store
            .update_agent_capabilities(agent_id, capabilities)
            .await?;

        let audit = AuditEvent::builder(
            AuditEventType::Register,
            record.identity(),
            AuditOutcome::Success,
        )
        .request_metadata(json!({
            "action": "update_capabilities",
            "capabilities": record.capabilities(),
        }))
        .build();
        if let Err(err) = self.append_audit(audit).await {
            warn!(identity = %record.identity(), "audit write failed; restoring previous capabilities");
            let _ = self
                .store
                .update_agent_capabilities(agent_id, before.capabilities().to_vec())
                .await;
            return Err(err);
        }
        self.publish(DirectoryEvent::agent_status_changed(&record)).await;
        Ok(record)
    }

    /// Removes an agent, announcing the removal.
    ///
    /// # Errors
    ///
    /// `NotFound` when the agent is not registered.
    pub async fn deregister_agent(&self, agent_id: AgentId) -> RegistryResult<AgentRecord> {
        let record = self.store.delete_agent(agent_id).await?;

        let audit = AuditEvent::builder(
            AuditEventType::Register,
            record.identity(),
            AuditOutcome::Success,
        )
        .request_metadata(json!({"action": "deregister_agent"}))
        .build();
        if let Err(err) = self.append_audit(audit).await {
            warn!(identity = %record.identity(), "audit write failed; restoring registration");
            let _ = self.store.insert_agent(&record).await;
            return Err(err);
        }
        self.publish(DirectoryEvent::removed("agent", record.identity())).await;
        info!(identity = %record.identity(), "agent deregistered");
        Ok(record)
    }

    /// Removes a knowledge base, announcing the removal.
    ///
    /// # Errors
    ///
    /// `NotFound` when the knowledge base is not registered.
    pub async fn deregister_kb(&self, kb_id: &KbId) -> RegistryResult<KbRecord> {
        let record = self.store.delete_kb(kb_id).await?;

        let audit = AuditEvent::builder(
            AuditEventType::Register,
            record.kb_id().as_str(),
            AuditOutcome::Success,
        )
        .request_metadata(json!({"action": "deregister_kb"}))
        .build();
        if let Err(err) = self.append_audit(audit).await {
            warn!(kb_id = %record.kb_id(), "audit write failed; restoring registration");
            let _ = self.store.insert_kb(&record).await;
            return Err(err);
        }
        self.publish(DirectoryEvent::removed("kb", record.kb_id().as_str())).await;
        info!(kb_id = %record.kb_id(), "knowledge base deregistered");
        Ok(record)
    }

    async fn audit_status_change(
        &self,
        subject_id: &str,
        from: ResourceStatus,
        to: ResourceStatus,
    ) -> RegistryResult<()> {
        let audit =
            AuditEvent::builder(AuditEventType::Register, subject_id, AuditOutcome::Success)
                .request_metadata(json!({
                    "action": "status_changed",
                    "from": from,
                    "to": to,
                }))
                .build();
        self.append_audit(audit).await
    }

    async fn append_audit(&self, event: AuditEvent) -> RegistryResult<()> {
        self.store
            .append(&event)
            .await
            .map_err(|err| RegistryError::AuditFailure {
                reason: err.to_string(),
            })
    }

    async fn publish(&self, event: DirectoryEvent) {
        let payload = match serde_json::to_vec(&event) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                warn!(?err, "failed to encode directory event");
                return;
            }
        };
        if let Err(err) = self
            .transport
            .publish(subject::DIRECTORY_UPDATES, payload)
            .await
        {
            // Announced changes are advisory; the committed row stays.
            warn!(?err, "failed to publish directory update");
        }
    }
}

impl std::fmt::Debug for RegistryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryService")
            .field("probe", &self.probe.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use mesh_primitives::{AuditFilter, KbType};
    use mesh_store::MemoryStore;
    use mesh_transport::InMemoryTransport;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn agent_request(identity: &str) -> RegisterAgentRequest {
        RegisterAgentRequest {
            identity: identity.to_owned(),
            version: "1.0.0".to_owned(),
            capabilities: vec!["analytics".to_owned()],
            operations: vec!["query".to_owned()],
            health_endpoint: "http://localhost:9001/health".to_owned(),
            metadata: None,
        }
    }

    fn kb_request(kb_id: &str) -> RegisterKbRequest {
        RegisterKbRequest {
            kb_id: kb_id.to_owned(),
            kb_type: KbType::Postgres,
            endpoint: "postgresql://db:5432/sales".to_owned(),
            operations: vec!["sql_query".to_owned()],
            kb_schema: None,
            credentials: None,
            metadata: None,
        }
    }

    fn service() -> (Arc<MemoryStore>, Arc<InMemoryTransport>, RegistryService) {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(InMemoryTransport::new());
        let registry = RegistryService::new(store.clone(), transport.clone());
        (store, transport, registry)
    }

    /// Delegates everything to a [`MemoryStore`] but fails audit appends
    /// while the flag is set.
    struct AuditFailingStore {
        inner: MemoryStore,
        fail_appends: AtomicBool,
    }

    impl AuditFailingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_appends: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl mesh_store::RegistryStore for AuditFailingStore {
        async fn insert_agent(&self, record: &AgentRecord) -> mesh_store::StoreResult<()> {
            self.inner.insert_agent(record).await
        }

        async fn get_agent(
            &self,
            agent_id: AgentId,
        ) -> mesh_store::StoreResult<Option<AgentRecord>> {
            self.inner.get_agent(agent_id).await
        }

        async fn get_agent_by_identity(
            &self,
            identity: &str,
        ) -> mesh_store::StoreResult<Option<AgentRecord>> {
            self.inner.get_agent_by_identity(identity).await
        }

        async fn list_agents(
            &self,
            filter: &mesh_store::AgentFilter,
        ) -> mesh_store::StoreResult<(Vec<AgentRecord>, usize)> {
            self.inner.list_agents(filter).await
        }

        async fn update_agent_status(
            &self,
            agent_id: AgentId,
            status: ResourceStatus,
        ) -> mesh_store::StoreResult<AgentRecord> {
            self.inner.update_agent_status(agent_id, status).await
        }

        async fn update_agent_capabilities(
            &self,
            agent_id: AgentId,
            capabilities: Vec<String>,
        ) -> mesh_store::StoreResult<AgentRecord> {
            self.inner
                .update_agent_capabilities(agent_id, capabilities)
                .await
        }

        async fn record_heartbeat(
            &self,
            agent_id: AgentId,
            at: DateTime<Utc>,
        ) -> mesh_store::StoreResult<()> {
            self.inner.record_heartbeat(agent_id, at).await
        }

        async fn delete_agent(&self, agent_id: AgentId) -> mesh_store::StoreResult<AgentRecord> {
            self.inner.delete_agent(agent_id).await
        }

        async fn insert_kb(&self, record: &KbRecord) -> mesh_store::StoreResult<()> {
            self.inner.insert_kb(record).await
        }

        async fn get_kb(&self, kb_id: &KbId) -> mesh_store::StoreResult<Option<KbRecord>> {
            self.inner.get_kb(kb_id).await
        }

        async fn list_kbs(
            &self,
            filter: &mesh_store::KbFilter,
        ) -> mesh_store::StoreResult<(Vec<KbRecord>, usize)> {
            self.inner.list_kbs(filter).await
        }

        async fn update_kb_status(
            &self,
            kb_id: &KbId,
            status: ResourceStatus,
        ) -> mesh_store::StoreResult<KbRecord> {
            self.inner.update_kb_status(kb_id, status).await
        }

        async fn record_kb_health_check(
            &self,
            kb_id: &KbId,
            at: DateTime<Utc>,
        ) -> mesh_store::StoreResult<()> {
            self.inner.record_kb_health_check(kb_id, at).await
        }

        async fn delete_kb(&self, kb_id: &KbId) -> mesh_store::StoreResult<KbRecord> {
            self.inner.delete_kb(kb_id).await
        }
    }

    #[async_trait]
    impl mesh_store::PolicyStore for AuditFailingStore {
        async fn upsert_policy(
            &self,
            record: &mesh_primitives::PolicyRecord,
        ) -> mesh_store::StoreResult<()> {
            self.inner.upsert_policy(record).await
        }

        async fn get_policy(
            &self,
            policy_id: &mesh_primitives::PolicyId,
        ) -> mesh_store::StoreResult<Option<mesh_primitives::PolicyRecord>> {
            self.inner.get_policy(policy_id).await
        }

        async fn list_policies(
            &self,
        ) -> mesh_store::StoreResult<Vec<mesh_primitives::PolicyRecord>> {
            self.inner.list_policies().await
        }

        async fn delete_policy(
            &self,
            policy_id: &mesh_primitives::PolicyId,
        ) -> mesh_store::StoreResult<bool> {
            self.inner.delete_policy(policy_id).await
        }
    }

    #[async_trait]
    impl mesh_store::AuditStore for AuditFailingStore {
        async fn append(&self, event: &AuditEvent) -> mesh_store::StoreResult<()> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(mesh_store::StoreError::backend("audit table unavailable"));
            }
            self.inner.append(event).await
        }

        async fn query(
            &self,
            filter: &AuditFilter,
        ) -> mesh_store::StoreResult<(Vec<AuditEvent>, usize)> {
            self.inner.query(filter).await
        }
    }

    #[tokio::test]
    async fn registration_audits_and_announces() {
        let (store, transport, registry) = service();
        let mut updates = transport.subscribe(subject::DIRECTORY_UPDATES).await.unwrap();

        let record = registry.register_agent(agent_request("analytics-agent-4")).await.unwrap();
        assert_eq!(record.status(), ResourceStatus::Active);

        let delivery = tokio::time::timeout(Duration::from_secs(1), updates.next())
            .await
            .unwrap()
            .unwrap();
        let event: DirectoryEvent = serde_json::from_slice(&delivery.payload).unwrap();
        assert_eq!(event.kind, crate::DirectoryEventKind::AgentRegistered);
        assert_eq!(event.data["identity"], "analytics-agent-4");

        let (rows, total) = mesh_store::AuditStore::query(store.as_ref(), &AuditFilter::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].source_id(), "analytics-agent-4");
    }

    #[tokio::test]
    async fn duplicate_identity_yields_duplicate_error() {
        let (_store, _transport, registry) = service();
        registry.register_agent(agent_request("sales-agent-1")).await.unwrap();
        let err = registry
            .register_agent(agent_request("sales-agent-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { .. }));
        assert_eq!(err.code(), mesh_primitives::ErrorCode::Duplicate);
    }

    struct FailingProbe;

    #[async_trait]
    impl HealthProbe for FailingProbe {
        async fn probe_agent(&self, record: &AgentRecord) -> RegistryResult<Duration> {
            Err(RegistryError::ProbeFailed {
                target: record.identity().to_owned(),
                reason: "unreachable".to_owned(),
            })
        }

        async fn probe_kb(&self, record: &KbRecord) -> RegistryResult<Duration> {
            Err(RegistryError::ProbeFailed {
                target: record.kb_id().to_string(),
                reason: "connection refused".to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn failed_connectivity_probe_registers_offline() {
        let (_store, transport, _unused) = service();
        let registry = RegistryService::new(Arc::new(MemoryStore::new()), transport)
            .with_probe(Arc::new(FailingProbe));

        let record = registry.register_kb(kb_request("sales-kb-1")).await.unwrap();
        assert_eq!(record.status(), ResourceStatus::Offline);
        assert!(record.probe_latency_ms().is_none());
    }

    #[tokio::test]
    async fn status_update_publishes_change() {
        let (_store, transport, registry) = service();
        let record = registry.register_agent(agent_request("ops-agent")).await.unwrap();

        let mut updates = transport.subscribe(subject::DIRECTORY_UPDATES).await.unwrap();
        registry
            .update_agent_status(record.agent_id(), ResourceStatus::Degraded)
            .await
            .unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(1), updates.next())
            .await
            .unwrap()
            .unwrap();
        let event: DirectoryEvent = serde_json::from_slice(&delivery.payload).unwrap();
        assert_eq!(event.kind, crate::DirectoryEventKind::StatusChanged);
        assert_eq!(event.data["status"], "degraded");
    }

    #[tokio::test]
    async fn mutations_roll_back_when_audit_write_fails() {
        let store = Arc::new(AuditFailingStore::new());
        let registry =
            RegistryService::new(store.clone(), Arc::new(InMemoryTransport::new()));
        let record = registry.register_agent(agent_request("ops-agent")).await.unwrap();
        let kb = registry.register_kb(kb_request("sales-kb-1")).await.unwrap();

        store.fail_appends.store(true, Ordering::SeqCst);

        let err = registry.deregister_agent(record.agent_id()).await.unwrap_err();
        assert!(matches!(err, RegistryError::AuditFailure { .. }));
        assert!(registry.get_agent(record.agent_id()).await.unwrap().is_some());

        let err = registry.deregister_kb(kb.kb_id()).await.unwrap_err();
        assert!(matches!(err, RegistryError::AuditFailure { .. }));
        assert!(registry.get_kb(kb.kb_id()).await.unwrap().is_some());

        let err = registry
            .update_agent_status(record.agent_id(), ResourceStatus::Degraded)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AuditFailure { .. }));
        assert_eq!(
            registry.get_agent(record.agent_id()).await.unwrap().unwrap().status(),
            ResourceStatus::Active
        );

        let err = registry
            .update_agent_capabilities(record.agent_id(), vec!["search".to_owned()])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AuditFailure { .. }));
        assert_eq!(
            registry
                .get_agent(record.agent_id())
                .await
                .unwrap()
                .unwrap()
                .capabilities(),
            ["analytics"]
        );

        // Registration itself also rolls back, leaving the identity free.
        let err = registry.register_agent(agent_request("late-agent")).await.unwrap_err();
        assert!(matches!(err, RegistryError::AuditFailure { .. }));
        store.fail_appends.store(false, Ordering::SeqCst);
        assert!(registry.register_agent(agent_request("late-agent")).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_operation_is_validation() {
        let (_store, _transport, registry) = service();
        let mut request = agent_request("weird-agent");
        request.operations = vec!["teleport".to_owned()];
        let err = registry.register_agent(request).await.unwrap_err();
        assert_eq!(err.code(), mesh_primitives::ErrorCode::InvalidOperation);
    }
}
