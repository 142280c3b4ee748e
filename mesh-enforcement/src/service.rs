//! The enforcement service: authorize, dispatch, mask, audit.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use mesh_adapters::{AdapterReply, AdapterRequest};
use mesh_policy::{DecisionInput, PolicyDecision, PolicyEvaluator, mask};
use mesh_primitives::{
    AgentRecord, AuditEvent, AuditEventType, AuditFilter, AuditOutcome, ErrorCode, KbId, KbRecord,
    RequestId,
};
use mesh_store::{AuditStore, MeshStore, RegistryStore};
use mesh_transport::{Transport, TransportError, subject};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::invocation::{InvocationEvent, InvocationLifecycle, InvocationState};
use crate::wire::{
    AgentInvokeReply, AgentInvokeRequest, AuditQueryReply, CompletionEvent, GovernedReply,
    HealthReply, KbQueryRequest, ReplyAudit, ReplyStatus,
};

/// Tuning knobs for the enforcement service.
#[derive(Debug, Clone, Copy)]
pub struct EnforcementConfig {
    /// Default adapter/agent dispatch timeout; a knowledge base can
    /// override it through its `dispatch_timeout_secs` metadata key.
    pub dispatch_timeout: Duration,
    /// When set, audit rows carry the full request and the masked full
    /// response.
    pub heavy_audit: bool,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(30),
            heavy_audit: false,
        }
    }
}

/// Governs every knowledge-base query and agent invocation on the mesh.
///
/// The ordering contract on every path: the audit row is committed before
/// the reply is produced, a denied request never reaches the adapter, and
/// masked fields never appear in cleartext in the reply or in heavy audit
/// payloads.
pub struct EnforcementService {
    store: Arc<dyn MeshStore>,
    transport: Arc<dyn Transport>,
    evaluator: Arc<dyn PolicyEvaluator>,
    config: EnforcementConfig,
}

impl EnforcementService {
    /// Creates an enforcement service.
    #[must_use]
    pub fn new(
        store: Arc<dyn MeshStore>,
        transport: Arc<dyn Transport>,
        evaluator: Arc<dyn PolicyEvaluator>,
        config: EnforcementConfig,
    ) -> Self {
        Self {
            store,
            transport,
            evaluator,
            config,
        }
    }

    /// Serves `mesh.routing.kb_query`.
    pub async fn query_kb_governed(&self, request: KbQueryRequest) -> GovernedReply {
        let request_id = request.request_id.unwrap_or_else(RequestId::random);

        // Malformed ids are schema failures; per the taxonomy they carry no
        // audit side effect.
        let kb_id = match KbId::new(request.kb_id.clone()) {
            Ok(kb_id) => kb_id,
            Err(err) => {
                return GovernedReply::error(request_id, ErrorCode::Validation, err.to_string());
            }
        };

        let kb = match self.store.get_kb(&kb_id).await {
            Ok(Some(kb)) => kb,
            Ok(None) => {
                let message = format!("KB {kb_id} not found in registry");
                return self
                    .kb_query_error(
                        request_id,
                        &request,
                        ErrorCode::UnknownResource,
                        message,
                        None,
                    )
                    .await;
            }
            Err(err) => {
                return self
                    .kb_query_error(
                        request_id,
                        &request,
                        ErrorCode::AuditFailure,
                        format!("registry read failed: {err}"),
                        None,
                    )
                    .await;
            }
        };

        let input = DecisionInput::kb_query(&request.requester_id, kb_id.as_str(), &request.operation);
        let decision = match self.evaluator.evaluate(&input).await {
            Ok(decision) => decision,
            Err(err) => {
                // Fail closed: an unreachable evaluator is an error, never
                // an implicit allow.
                return self
                    .kb_query_error(
                        request_id,
                        &request,
                        ErrorCode::EvaluatorUnavailable,
                        err.to_string(),
                        None,
                    )
                    .await;
            }
        };

        if !decision.is_allow() {
            let reason = decision
                .reason()
                .unwrap_or("denied by policy")
                .to_owned();
            let audit = AuditEvent::builder(
                AuditEventType::Query,
                &request.requester_id,
                AuditOutcome::Denied,
            )
            .target_id(kb_id.as_str())
            .policy_decision(json!(decision))
            .request_metadata(json!({
                "request_id": request_id,
                "operation": request.operation,
            }))
            .build();
            if let Err(reply) = self.commit_audit(audit, request_id).await {
                return reply;
            }
            info!(requester = %request.requester_id, kb = %kb_id, "kb query denied");
            return GovernedReply::denied(request_id, reason);
        }

        let raw = match self.dispatch_to_adapter(&kb, &request).await {
            Ok(raw) => raw,
            Err(message) => {
                return self
                    .kb_query_error(
                        request_id,
                        &request,
                        ErrorCode::AdapterError,
                        message,
                        Some(&decision),
                    )
                    .await;
            }
        };

        let masked = mask(&raw, decision.masking_rules());

        let mut builder = AuditEvent::builder(
            AuditEventType::Query,
            &request.requester_id,
            AuditOutcome::Success,
        )
        .target_id(kb_id.as_str())
        .masked_fields(decision.masking_rules().to_vec())
        .policy_decision(json!(decision))
        .request_metadata(json!({
            "request_id": request_id,
            "operation": request.operation,
        }));
        if self.config.heavy_audit {
            builder = builder
                .full_request(json!({
                    "operation": request.operation,
                    "params": request.params,
                }))
                .full_response(masked.clone());
        }
        let audit = builder.build();
        let timestamp = audit.timestamp();
        if let Err(reply) = self.commit_audit(audit, request_id).await {
            return reply;
        }

        info!(
            requester = %request.requester_id,
            kb = %kb_id,
            operation = %request.operation,
            masked = decision.masking_rules().len(),
            "kb query served"
        );
        GovernedReply::success(
            request_id,
            masked,
            ReplyAudit {
                fields_masked: decision.masking_rules().to_vec(),
                policy_version: decision.policy_version().map(ToOwned::to_owned),
                timestamp,
            },
        )
    }

    /// Serves `mesh.routing.agent_invoke`.
    pub async fn invoke_agent_governed(&self, request: AgentInvokeRequest) -> AgentInvokeReply {
        let request_id = request.request_id.unwrap_or_else(RequestId::random);

        let target = match self.resolve_agent(&request.target_agent_id).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                let message = format!(
                    "agent {} not found in registry",
                    request.target_agent_id
                );
                return self
                    .invoke_error(request_id, &request, ErrorCode::UnknownResource, message)
                    .await;
            }
            Err(err) => {
                return self
                    .invoke_error(
                        request_id,
                        &request,
                        ErrorCode::AuditFailure,
                        format!("registry read failed: {err}"),
                    )
                    .await;
            }
        };

        let input = DecisionInput::agent_invoke(&request.source_agent_id, &request.target_agent_id);
        let decision = match self.evaluator.evaluate(&input).await {
            Ok(decision) => decision,
            Err(err) => {
                return self
                    .invoke_error(
                        request_id,
                        &request,
                        ErrorCode::EvaluatorUnavailable,
                        err.to_string(),
                    )
                    .await;
            }
        };

        if !decision.is_allow() {
            let reason = decision.reason().unwrap_or("denied by policy").to_owned();
            let audit = AuditEvent::builder(
                AuditEventType::Invoke,
                &request.source_agent_id,
                AuditOutcome::Denied,
            )
            .target_id(&request.target_agent_id)
            .policy_decision(json!(decision))
            .request_metadata(json!({
                "request_id": request_id,
                "operation": request.operation,
            }))
            .build();
            if let Err(reply) = self.commit_audit(audit, request_id).await {
                return invoke_audit_failure(reply, request_id);
            }
            return AgentInvokeReply {
                status: ReplyStatus::Denied,
                tracking_id: None,
                state: None,
                error: None,
                code: Some(ErrorCode::Denied),
                reason: Some(reason),
                request_id,
            };
        }

        let mut lifecycle = InvocationLifecycle::begin();
        if let Err(reply) = self
            .audit_transition(&request, request_id, &lifecycle, None, None)
            .await
        {
            return invoke_audit_failure(reply, request_id);
        }

        let dispatch_payload = json!({
            "operation": request.operation,
            "payload": request.payload,
            "source_agent_id": request.source_agent_id,
            "tracking_id": lifecycle.tracking_id(),
            "request_id": request_id,
        });
        let payload = match serde_json::to_vec(&dispatch_payload) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                return self
                    .invoke_error(
                        request_id,
                        &request,
                        ErrorCode::Validation,
                        format!("failed to encode invocation: {err}"),
                    )
                    .await;
            }
        };

        // Transition to processing before the await so a concurrent audit
        // reader sees the dispatch in flight.
        let _ = lifecycle.transition(InvocationEvent::Dispatch);
        if let Err(reply) = self
            .audit_transition(&request, request_id, &lifecycle, None, None)
            .await
        {
            return invoke_audit_failure(reply, request_id);
        }

        let outcome = self
            .transport
            .request(
                &subject::agent_inbox(target.agent_id()),
                payload,
                self.config.dispatch_timeout,
            )
            .await;

        match outcome {
            Ok(raw) => {
                let response: Value = serde_json::from_slice(&raw).unwrap_or(Value::Null);
                let masked = mask(&response, decision.masking_rules());
                let _ = lifecycle.transition(InvocationEvent::Complete);
                if let Err(reply) = self
                    .audit_transition(&request, request_id, &lifecycle, Some(&decision), Some(&masked))
                    .await
                {
                    return invoke_audit_failure(reply, request_id);
                }
                self.publish_completion(&request, &lifecycle, Some(masked), None)
                    .await;
                AgentInvokeReply {
                    status: ReplyStatus::Success,
                    tracking_id: Some(lifecycle.tracking_id()),
                    state: Some(lifecycle.state()),
                    error: None,
                    code: None,
                    reason: None,
                    request_id,
                }
            }
            Err(err) => {
                let message = dispatch_failure_message(&err);
                let _ = lifecycle.transition(InvocationEvent::Fail);
                if let Err(reply) = self
                    .audit_transition(&request, request_id, &lifecycle, None, None)
                    .await
                {
                    return invoke_audit_failure(reply, request_id);
                }
                self.publish_completion(&request, &lifecycle, None, Some(message.clone()))
                    .await;
                AgentInvokeReply {
                    status: ReplyStatus::Error,
                    tracking_id: Some(lifecycle.tracking_id()),
                    state: Some(lifecycle.state()),
                    error: Some(message),
                    code: Some(ErrorCode::AdapterError),
                    reason: None,
                    request_id,
                }
            }
        }
    }

    /// Serves `mesh.audit.query`.
    ///
    /// # Errors
    ///
    /// Returns the store failure message for the router to wrap.
    pub async fn query_audit_logs(&self, filter: &AuditFilter) -> Result<AuditQueryReply, String> {
        let (audit_logs, total_count) = self
            .store
            .query(filter)
            .await
            .map_err(|err| err.to_string())?;
        Ok(AuditQueryReply {
            audit_logs,
            total_count,
            filters_applied: filter.applied(),
        })
    }

    /// Serves `mesh.health`.
    pub async fn health(&self) -> HealthReply {
        let store_ok = self
            .store
            .list_agents(&mesh_store::AgentFilter {
                limit: Some(0),
                ..mesh_store::AgentFilter::default()
            })
            .await
            .is_ok();

        let probe = DecisionInput::kb_query("mesh-health", "mesh-health", "health_check");
        let evaluator_ok = self.evaluator.evaluate(&probe).await.is_ok();

        let healthy = store_ok && evaluator_ok;
        HealthReply {
            status: if healthy { "healthy" } else { "degraded" }.to_owned(),
            components: json!({
                "transport": "ok",
                "store": if store_ok { "ok" } else { "error" },
                "policy_evaluator": if evaluator_ok { "ok" } else { "unreachable" },
            }),
        }
    }

    async fn dispatch_to_adapter(
        &self,
        kb: &KbRecord,
        request: &KbQueryRequest,
    ) -> Result<Value, String> {
        let adapter_request = AdapterRequest {
            operation: request.operation.clone(),
            params: request.params.clone(),
        };
        let payload = serde_json::to_vec(&adapter_request)
            .map_err(|err| format!("failed to encode adapter request: {err}"))?;

        let deadline = kb_dispatch_timeout(kb, self.config.dispatch_timeout);
        let raw = self
            .transport
            .request(
                &subject::adapter_query(kb.kb_id()),
                Bytes::from(payload),
                deadline,
            )
            .await
            .map_err(|err| dispatch_failure_message(&err))?;

        let reply: AdapterReply = serde_json::from_slice(&raw)
            .map_err(|err| format!("malformed adapter reply: {err}"))?;
        if !reply.is_success() {
            return Err(reply
                .error
                .unwrap_or_else(|| "adapter reported an unspecified error".to_owned()));
        }
        Ok(reply.data.unwrap_or(Value::Null))
    }

    async fn resolve_agent(&self, target: &str) -> Result<Option<AgentRecord>, String> {
        if let Some(record) = self
            .store
            .get_agent_by_identity(target)
            .await
            .map_err(|err| err.to_string())?
        {
            return Ok(Some(record));
        }
        if let Ok(agent_id) = target.parse() {
            return self
                .store
                .get_agent(agent_id)
                .await
                .map_err(|err| err.to_string());
        }
        Ok(None)
    }

    /// Writes an error-outcome audit row, then produces the error reply.
    async fn kb_query_error(
        &self,
        request_id: RequestId,
        request: &KbQueryRequest,
        code: ErrorCode,
        message: String,
        decision: Option<&PolicyDecision>,
    ) -> GovernedReply {
        let mut builder = AuditEvent::builder(
            AuditEventType::Query,
            &request.requester_id,
            AuditOutcome::Error,
        )
        .target_id(&request.kb_id)
        .request_metadata(json!({
            "request_id": request_id,
            "operation": request.operation,
            "error": message,
            "code": code,
        }));
        if let Some(decision) = decision {
            builder = builder.policy_decision(json!(decision));
        }
        if let Err(reply) = self.commit_audit(builder.build(), request_id).await {
            return reply;
        }
        warn!(requester = %request.requester_id, kb = %request.kb_id, %message, "kb query failed");
        GovernedReply::error(request_id, code, message)
    }

    async fn invoke_error(
        &self,
        request_id: RequestId,
        request: &AgentInvokeRequest,
        code: ErrorCode,
        message: String,
    ) -> AgentInvokeReply {
        let audit = AuditEvent::builder(
            AuditEventType::Invoke,
            &request.source_agent_id,
            AuditOutcome::Error,
        )
        .target_id(&request.target_agent_id)
        .request_metadata(json!({
            "request_id": request_id,
            "operation": request.operation,
            "error": message,
            "code": code,
        }))
        .build();
        if let Err(reply) = self.commit_audit(audit, request_id).await {
            return invoke_audit_failure(reply, request_id);
        }
        warn!(
            source = %request.source_agent_id,
            target = %request.target_agent_id,
            %message,
            "agent invocation failed"
        );
        AgentInvokeReply {
            status: ReplyStatus::Error,
            tracking_id: None,
            state: None,
            error: Some(message),
            code: Some(code),
            reason: None,
            request_id,
        }
    }

    /// Audits one lifecycle transition. `masked_response` is the already
    /// masked target reply, attached (with the full request) only when
    /// heavy audit logging is on; cleartext never reaches the store.
    async fn audit_transition(
        &self,
        request: &AgentInvokeRequest,
        request_id: RequestId,
        lifecycle: &InvocationLifecycle,
        decision: Option<&PolicyDecision>,
        masked_response: Option<&Value>,
    ) -> Result<(), GovernedReply> {
        let outcome = match lifecycle.state() {
            InvocationState::Error => AuditOutcome::Error,
            _ => AuditOutcome::Success,
        };
        let mut builder = AuditEvent::builder(
            AuditEventType::Invoke,
            &request.source_agent_id,
            outcome,
        )
        .target_id(&request.target_agent_id)
        .request_metadata(json!({
            "request_id": request_id,
            "operation": request.operation,
            "tracking_id": lifecycle.tracking_id(),
            "state": lifecycle.state(),
        }))
        .provenance(&request.source_agent_id)
        .provenance(&request.target_agent_id);
        if let Some(decision) = decision {
            builder = builder
                .masked_fields(decision.masking_rules().to_vec())
                .policy_decision(json!(decision));
        }
        if self.config.heavy_audit {
            builder = builder.full_request(json!({
                "operation": request.operation,
                "payload": request.payload,
            }));
            if let Some(masked) = masked_response {
                builder = builder.full_response(masked.clone());
            }
        }
        self.commit_audit(builder.build(), request_id).await
    }

    /// Appends the audit row; on failure the operation becomes an error
    /// reply, never a success.
    async fn commit_audit(
        &self,
        event: AuditEvent,
        request_id: RequestId,
    ) -> Result<(), GovernedReply> {
        match self.store.append(&event).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(?err, "audit write failed; refusing to reply success");
                Err(GovernedReply::error(
                    request_id,
                    ErrorCode::AuditFailure,
                    format!("audit write failed: {err}"),
                ))
            }
        }
    }

    async fn publish_completion(
        &self,
        request: &AgentInvokeRequest,
        lifecycle: &InvocationLifecycle,
        data: Option<Value>,
        error: Option<String>,
    ) {
        let event = CompletionEvent {
            tracking_id: lifecycle.tracking_id(),
            source_agent_id: request.source_agent_id.clone(),
            target_agent_id: request.target_agent_id.clone(),
            state: lifecycle.state(),
            data,
            error,
            timestamp: chrono::Utc::now(),
        };
        let Ok(payload) = serde_json::to_vec(&event) else {
            warn!("failed to encode completion event");
            return;
        };
        if let Err(err) = self
            .transport
            .publish(subject::ROUTING_COMPLETION, Bytes::from(payload))
            .await
        {
            warn!(?err, "failed to publish completion event");
        }
    }
}

impl std::fmt::Debug for EnforcementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnforcementService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn invoke_audit_failure(reply: GovernedReply, request_id: RequestId) -> AgentInvokeReply {
    AgentInvokeReply {
        status: ReplyStatus::Error,
        tracking_id: None,
        state: None,
        error: reply.error,
        code: reply.code,
        reason: None,
        request_id,
    }
}

fn dispatch_failure_message(err: &TransportError) -> String {
    match err {
        TransportError::Timeout { .. } => "timeout".to_owned(),
        other => other.to_string(),
    }
}

fn kb_dispatch_timeout(kb: &KbRecord, default: Duration) -> Duration {
    kb.metadata()
        .get("dispatch_timeout_secs")
        .and_then(Value::as_u64)
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use mesh_policy::RuleBasedEvaluator;
    use mesh_primitives::{KbType, PolicyId, PolicyRecord};
    use mesh_registry::RegistryService;
    use mesh_registry::wire::RegisterKbRequest;
    use mesh_store::{AuditStore, MemoryStore};
    use mesh_transport::InMemoryTransport;

    async fn setup() -> (
        Arc<MemoryStore>,
        Arc<InMemoryTransport>,
        Arc<RuleBasedEvaluator>,
        EnforcementService,
    ) {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(InMemoryTransport::new());
        let evaluator = Arc::new(RuleBasedEvaluator::new());
        let service = EnforcementService::new(
            store.clone(),
            transport.clone(),
            evaluator.clone(),
            EnforcementConfig {
                dispatch_timeout: Duration::from_millis(250),
                heavy_audit: false,
            },
        );

        let registry = RegistryService::new(store.clone(), transport.clone());
        registry
            .register_kb(RegisterKbRequest {
                kb_id: "sales-kb-1".to_owned(),
                kb_type: KbType::Postgres,
                endpoint: "postgresql://db:5432/sales".to_owned(),
                operations: vec!["sql_query".to_owned(), "execute_sql".to_owned()],
                kb_schema: None,
                credentials: None,
                metadata: None,
            })
            .await
            .unwrap();

        (store, transport, evaluator, service)
    }

    fn kb_request(operation: &str) -> KbQueryRequest {
        KbQueryRequest {
            requester_id: "marketing-agent-2".to_owned(),
            kb_id: "sales-kb-1".to_owned(),
            operation: operation.to_owned(),
            params: json!({"query": "SELECT * FROM customers"}),
            request_id: None,
        }
    }

    async fn install(evaluator: &RuleBasedEvaluator, body: Value) {
        let record =
            PolicyRecord::new(PolicyId::new("test-policy").unwrap(), body.to_string()).unwrap();
        evaluator.install_policy(&record).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_kb_is_an_audited_error() {
        let (store, _transport, _evaluator, service) = setup().await;
        let reply = service
            .query_kb_governed(KbQueryRequest {
                kb_id: "nonexistent-kb-999".to_owned(),
                ..kb_request("sql_query")
            })
            .await;

        assert_eq!(reply.status, ReplyStatus::Error);
        assert_eq!(reply.code, Some(ErrorCode::UnknownResource));
        assert_eq!(
            reply.error.as_deref(),
            Some("KB nonexistent-kb-999 not found in registry")
        );

        let (rows, _) = store
            .query(&AuditFilter {
                outcome: Some(AuditOutcome::Error),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target_id(), Some("nonexistent-kb-999"));
    }

    #[tokio::test]
    async fn denied_query_never_reaches_the_adapter() {
        let (store, transport, evaluator, service) = setup().await;
        install(
            &evaluator,
            json!({"rules": [
                {"effect": "deny", "action": "execute_sql", "reason": "write access is not granted"}
            ]}),
        )
        .await;

        let mut adapter_traffic = transport
            .subscribe("sales-kb-1.adapter.query")
            .await
            .unwrap();

        let reply = service.query_kb_governed(kb_request("execute_sql")).await;
        assert_eq!(reply.status, ReplyStatus::Denied);
        assert_eq!(reply.reason.as_deref(), Some("write access is not granted"));

        // Nothing may have been dispatched for a denied request.
        let nothing = tokio::time::timeout(Duration::from_millis(50), adapter_traffic.next()).await;
        assert!(nothing.is_err());

        let (rows, _) = store
            .query(&AuditFilter {
                outcome: Some(AuditOutcome::Denied),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn evaluator_failure_fails_closed() {
        struct BrokenEvaluator;

        #[async_trait::async_trait]
        impl PolicyEvaluator for BrokenEvaluator {
            async fn evaluate(
                &self,
                _input: &DecisionInput,
            ) -> mesh_policy::PolicyResult<PolicyDecision> {
                Err(mesh_policy::PolicyError::unavailable("connection refused"))
            }

            async fn install_policy(
                &self,
                _record: &PolicyRecord,
            ) -> mesh_policy::PolicyResult<()> {
                Ok(())
            }

            async fn remove_policy(&self, _id: &PolicyId) -> mesh_policy::PolicyResult<()> {
                Ok(())
            }
        }

        let (store, transport, _evaluator, _service) = setup().await;
        let service = EnforcementService::new(
            store.clone(),
            transport,
            Arc::new(BrokenEvaluator),
            EnforcementConfig::default(),
        );

        let reply = service.query_kb_governed(kb_request("sql_query")).await;
        assert_eq!(reply.status, ReplyStatus::Error);
        assert_eq!(reply.code, Some(ErrorCode::EvaluatorUnavailable));

        let (rows, _) = store.query(&AuditFilter::default()).await.unwrap();
        assert!(rows.iter().any(|row| row.outcome() == AuditOutcome::Error));
    }

    #[tokio::test]
    async fn allowed_query_without_worker_times_out_as_error() {
        let (_store, transport, evaluator, service) = setup().await;
        install(&evaluator, json!({"rules": [{"effect": "allow"}]})).await;

        // Subscribe but never answer, so the dispatch deadline elapses.
        let _silent = transport.subscribe("sales-kb-1.adapter.query").await.unwrap();

        let reply = service.query_kb_governed(kb_request("sql_query")).await;
        assert_eq!(reply.status, ReplyStatus::Error);
        assert_eq!(reply.code, Some(ErrorCode::AdapterError));
        assert_eq!(reply.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn heavy_audit_attaches_masked_invoke_response() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(InMemoryTransport::new());
        let evaluator = Arc::new(RuleBasedEvaluator::new());
        install(
            &evaluator,
            json!({"rules": [{
                "effect": "allow",
                "resource_type": "agent",
                "action": "invoke",
                "masking_rules": ["api_key"],
            }]}),
        )
        .await;

        let registry = RegistryService::new(store.clone(), transport.clone());
        let target = registry
            .register_agent(mesh_registry::wire::RegisterAgentRequest {
                identity: "worker-agent".to_owned(),
                version: "1.0.0".to_owned(),
                capabilities: Vec::new(),
                operations: vec!["invoke".to_owned()],
                health_endpoint: "http://localhost:9001/health".to_owned(),
                metadata: None,
            })
            .await
            .unwrap();

        let mut inbound = transport
            .subscribe(&subject::agent_inbox(target.agent_id()))
            .await
            .unwrap();
        let responder = transport.clone();
        tokio::spawn(async move {
            let delivery = inbound.next().await.unwrap();
            let reply = json!({"api_key": "sk-secret", "note": "done"});
            responder
                .respond(&delivery, Bytes::from(serde_json::to_vec(&reply).unwrap()))
                .await
                .unwrap();
        });

        let service = EnforcementService::new(
            store.clone(),
            transport,
            evaluator,
            EnforcementConfig {
                dispatch_timeout: Duration::from_secs(1),
                heavy_audit: true,
            },
        );
        let reply = service
            .invoke_agent_governed(AgentInvokeRequest {
                source_agent_id: "coordinator-agent".to_owned(),
                target_agent_id: "worker-agent".to_owned(),
                operation: "invoke".to_owned(),
                payload: json!({"task": "summarize"}),
                request_id: None,
            })
            .await;
        assert_eq!(reply.status, ReplyStatus::Success);

        let (rows, _) = store
            .query(&AuditFilter {
                event_type: Some(AuditEventType::Invoke),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        let completed = rows
            .iter()
            .find(|row| row.request_metadata().unwrap()["state"] == "completed")
            .unwrap();
        let full_response = completed.full_response().unwrap();
        assert_eq!(full_response["api_key"], "***");
        assert_eq!(full_response["note"], "done");
        assert_eq!(
            completed.full_request().unwrap()["payload"]["task"],
            "summarize"
        );
        // Non-terminal transitions carry the request but no response yet.
        let queued = rows
            .iter()
            .find(|row| row.request_metadata().unwrap()["state"] == "queued")
            .unwrap();
        assert!(queued.full_request().is_some());
        assert!(queued.full_response().is_none());
    }

    #[tokio::test]
    async fn audit_query_surface_echoes_filters() {
        let (_store, _transport, _evaluator, service) = setup().await;
        let reply = service
            .query_audit_logs(&AuditFilter {
                source_id: Some("sales-kb-1".to_owned()),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        // The registration in setup() wrote one register row for the kb.
        assert_eq!(reply.total_count, 1);
        assert_eq!(reply.filters_applied["source_id"], "sales-kb-1");
    }

    #[tokio::test]
    async fn health_reports_components() {
        let (_store, _transport, _evaluator, service) = setup().await;
        let health = service.health().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.components["store"], "ok");
    }
}
