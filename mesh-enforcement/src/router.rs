//! Thin dispatch over the `mesh.*` request subjects.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use mesh_policy::PolicyAdmin;
use mesh_policy::wire::{
    DeletePolicyReply, DeletePolicyRequest, GetPolicyRequest, PolicyListReply,
    UploadPolicyReply, UploadPolicyRequest,
};
use mesh_primitives::{ErrorCode, KbId, PolicyId, RequestId};
use mesh_registry::wire::{
    DeregisterAgentRequest, DeregisterKbRequest, DeregisterReply, HeartbeatReply,
    HeartbeatRequest, RegisterAgentReply, RegisterAgentRequest, RegisterKbReply,
    RegisterKbRequest,
};
use mesh_registry::{DirectoryQueryRequest, DirectoryService, RegistryService};
use mesh_transport::{Delivery, DeliveryStream, Transport, TransportResult, subject};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::pool::HandlerPool;
use crate::service::EnforcementService;
use crate::wire::{AgentInvokeRequest, AuditQueryRequest, ErrorReply, KbQueryRequest};

/// Demultiplexes inbound request subjects onto the mesh services.
///
/// The router does no policy work: it parses and validates JSON, attaches
/// a `request_id` when absent, delegates, and serializes the reply. Every
/// delivery runs as its own pooled task.
pub struct MeshRouter {
    transport: Arc<dyn Transport>,
    enforcement: Arc<EnforcementService>,
    registry: Arc<RegistryService>,
    directory: Arc<DirectoryService>,
    admin: Arc<PolicyAdmin>,
    pool: HandlerPool,
}

impl MeshRouter {
    /// Creates a router over the mesh services.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        enforcement: Arc<EnforcementService>,
        registry: Arc<RegistryService>,
        directory: Arc<DirectoryService>,
        admin: Arc<PolicyAdmin>,
        pool: HandlerPool,
    ) -> Self {
        Self {
            transport,
            enforcement,
            registry,
            directory,
            admin,
            pool,
        }
    }

    /// Subscribes every request subject and serves until the transport
    /// closes.
    ///
    /// # Errors
    ///
    /// Returns a transport error when a subscription cannot be
    /// established.
    pub async fn run(self: Arc<Self>) -> TransportResult<()> {
        let subjects = [
            subject::KB_QUERY,
            subject::AGENT_INVOKE,
            subject::AGENT_REGISTER,
            subject::AGENT_HEARTBEAT,
            subject::AGENT_DEREGISTER,
            subject::KB_REGISTER,
            subject::KB_DEREGISTER,
            subject::DIRECTORY_QUERY,
            subject::AUDIT_QUERY,
            subject::POLICY_UPLOAD,
            subject::POLICY_LIST,
            subject::POLICY_GET,
            subject::POLICY_DELETE,
            subject::HEALTH,
        ];

        let mut consumers = Vec::with_capacity(subjects.len());
        for name in subjects {
            let stream = self.transport.subscribe(name).await?;
            let router = Arc::clone(&self);
            consumers.push(tokio::spawn(router.consume(stream)));
        }
        info!("mesh router serving {} subjects", subjects.len());

        for consumer in consumers {
            let _ = consumer.await;
        }
        Ok(())
    }

    async fn consume(self: Arc<Self>, mut stream: DeliveryStream) {
        while let Some(delivery) = stream.next().await {
            let router = Arc::clone(&self);
            self.pool.spawn(async move {
                router.handle(delivery).await;
            });
        }
    }

    async fn handle(&self, delivery: Delivery) {
        debug!(subject = %delivery.subject, "inbound request");
        let reply = self.dispatch(&delivery).await;
        if delivery.reply.is_none() {
            warn!(subject = %delivery.subject, "request without reply inbox dropped");
            return;
        }
        if let Err(err) = self.transport.respond(&delivery, reply).await {
            warn!(subject = %delivery.subject, ?err, "failed to send reply");
        }
    }

    async fn dispatch(&self, delivery: &Delivery) -> Bytes {
        match delivery.subject.as_str() {
            subject::KB_QUERY => match parse::<KbQueryRequest>(&delivery.payload) {
                Ok(mut request) => {
                    request.request_id.get_or_insert_with(RequestId::random);
                    encode(&self.enforcement.query_kb_governed(request).await)
                }
                Err(reply) => encode(&reply),
            },
            subject::AGENT_INVOKE => match parse::<AgentInvokeRequest>(&delivery.payload) {
                Ok(mut request) => {
                    request.request_id.get_or_insert_with(RequestId::random);
                    encode(&self.enforcement.invoke_agent_governed(request).await)
                }
                Err(reply) => encode(&reply),
            },
            subject::AGENT_REGISTER => match parse::<RegisterAgentRequest>(&delivery.payload) {
                Ok(request) => match self.registry.register_agent(request).await {
                    Ok(record) => encode(&RegisterAgentReply::from_record(&record)),
                    Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                },
                Err(reply) => encode(&reply),
            },
            subject::AGENT_HEARTBEAT => match parse::<HeartbeatRequest>(&delivery.payload) {
                Ok(request) => match self.registry.heartbeat(request.agent_id).await {
                    Ok(timestamp) => encode(&HeartbeatReply {
                        success: true,
                        agent_id: request.agent_id,
                        timestamp,
                    }),
                    Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                },
                Err(reply) => encode(&reply),
            },
            subject::AGENT_DEREGISTER => {
                match parse::<DeregisterAgentRequest>(&delivery.payload) {
                    Ok(request) => match self.registry.deregister_agent(request.agent_id).await {
                        Ok(_) => encode(&DeregisterReply { success: true }),
                        Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                    },
                    Err(reply) => encode(&reply),
                }
            }
            subject::KB_REGISTER => match parse::<RegisterKbRequest>(&delivery.payload) {
                Ok(request) => match self.registry.register_kb(request).await {
                    Ok(record) => encode(&RegisterKbReply::from_record(&record)),
                    Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                },
                Err(reply) => encode(&reply),
            },
            subject::KB_DEREGISTER => match parse::<DeregisterKbRequest>(&delivery.payload) {
                Ok(request) => match KbId::new(request.kb_id) {
                    Ok(kb_id) => match self.registry.deregister_kb(&kb_id).await {
                        Ok(_) => encode(&DeregisterReply { success: true }),
                        Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                    },
                    Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                },
                Err(reply) => encode(&reply),
            },
            subject::DIRECTORY_QUERY => match parse::<DirectoryQueryRequest>(&delivery.payload) {
                Ok(request) => match self.directory.query(&request).await {
                    Ok(reply) => encode(&reply),
                    Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                },
                Err(reply) => encode(&reply),
            },
            subject::AUDIT_QUERY => match parse::<AuditQueryRequest>(&delivery.payload) {
                Ok(filter) => match self.enforcement.query_audit_logs(&filter).await {
                    Ok(reply) => encode(&reply),
                    Err(reason) => {
                        encode(&ErrorReply::new(ErrorCode::AuditFailure, reason))
                    }
                },
                Err(reply) => encode(&reply),
            },
            subject::POLICY_UPLOAD => match parse::<UploadPolicyRequest>(&delivery.payload) {
                Ok(request) => match PolicyId::new(request.policy_id) {
                    Ok(policy_id) => match self
                        .admin
                        .upload_policy(policy_id, request.body, request.persist)
                        .await
                    {
                        Ok(record) => encode(&UploadPolicyReply::from_record(&record)),
                        Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                    },
                    Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                },
                Err(reply) => encode(&reply),
            },
            subject::POLICY_LIST => match self.admin.list_policies().await {
                Ok(policies) => {
                    let total_count = policies.len();
                    encode(&PolicyListReply {
                        policies,
                        total_count,
                    })
                }
                Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
            },
            subject::POLICY_GET => match parse::<GetPolicyRequest>(&delivery.payload) {
                Ok(request) => match PolicyId::new(request.policy_id) {
                    Ok(policy_id) => match self.admin.get_policy(&policy_id).await {
                        Ok(Some(record)) => encode(&record),
                        Ok(None) => encode(&ErrorReply::new(
                            ErrorCode::UnknownResource,
                            format!("policy {policy_id} not found"),
                        )),
                        Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                    },
                    Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                },
                Err(reply) => encode(&reply),
            },
            subject::POLICY_DELETE => match parse::<DeletePolicyRequest>(&delivery.payload) {
                Ok(request) => match PolicyId::new(request.policy_id) {
                    Ok(policy_id) => match self.admin.delete_policy(&policy_id).await {
                        Ok(success) => encode(&DeletePolicyReply { success }),
                        Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                    },
                    Err(err) => encode(&ErrorReply::new(err.code(), err.to_string())),
                },
                Err(reply) => encode(&reply),
            },
            subject::HEALTH => encode(&self.enforcement.health().await),
            other => encode(&ErrorReply::new(
                ErrorCode::Validation,
                format!("unsupported subject `{other}`"),
            )),
        }
    }
}

impl std::fmt::Debug for MeshRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshRouter").finish_non_exhaustive()
    }
}

fn parse<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, ErrorReply> {
    serde_json::from_slice(payload).map_err(|err| {
        ErrorReply::new(
            ErrorCode::Validation,
            format!("malformed request: {err}"),
        )
    })
}

fn encode<T: Serialize>(reply: &T) -> Bytes {
    match serde_json::to_vec(reply) {
        Ok(bytes) => Bytes::from(bytes),
        Err(err) => {
            warn!(?err, "failed to encode reply");
            Bytes::from(
                json!({"error": "internal serialization failure", "code": "VALIDATION"})
                    .to_string(),
            )
        }
    }
}
