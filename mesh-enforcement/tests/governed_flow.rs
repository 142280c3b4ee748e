//! End-to-end flows over the full in-process mesh: router, enforcement,
//! registry, directory, policy evaluator, and a live adapter worker.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use mesh_adapters::{AdapterWorker, OperationRegistry, TableBackend};
use mesh_enforcement::{EnforcementConfig, EnforcementService, HandlerPool, MeshRouter};
use mesh_enforcement::wire::{AuditQueryReply, GovernedReply, ReplyStatus};
use mesh_policy::{PolicyAdmin, RuleBasedEvaluator};
use mesh_primitives::{AuditOutcome, ErrorCode, KbId, PolicyId};
use mesh_registry::{DirectoryService, RegistryService};
use mesh_store::MemoryStore;
use mesh_transport::{InMemoryTransport, Transport, TransportError, subject};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

struct Mesh {
    transport: Arc<InMemoryTransport>,
    admin: Arc<PolicyAdmin>,
    mirror_dir: std::path::PathBuf,
}

impl Drop for Mesh {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.mirror_dir);
    }
}

async fn boot() -> Mesh {
    let transport = Arc::new(InMemoryTransport::new());
    let store = Arc::new(MemoryStore::new());
    let evaluator = Arc::new(RuleBasedEvaluator::new());

    let enforcement = Arc::new(EnforcementService::new(
        store.clone(),
        transport.clone(),
        evaluator.clone(),
        EnforcementConfig {
            dispatch_timeout: Duration::from_secs(2),
            heavy_audit: false,
        },
    ));
    let registry = Arc::new(RegistryService::new(store.clone(), transport.clone()));
    let directory = Arc::new(DirectoryService::new(store.clone()));

    let mut mirror_dir = std::env::temp_dir();
    mirror_dir.push(format!("mesh-e2e-{}", uuid::Uuid::new_v4()));
    let admin = Arc::new(PolicyAdmin::new(store, evaluator, &mirror_dir));

    let router = Arc::new(MeshRouter::new(
        transport.clone(),
        enforcement,
        registry,
        directory,
        admin.clone(),
        HandlerPool::default(),
    ));
    tokio::spawn(router.run());

    let backend = Arc::new(TableBackend::new().with_table(
        "customers",
        vec![
            json!({"name": "Acme", "customer_email": "ceo@acme.com", "customer_phone": "+1-555-0123"}),
            json!({"name": "Globex", "customer_email": "cfo@globex.com", "customer_phone": "+1-555-0456"}),
        ],
    ));
    let worker = AdapterWorker::new(
        KbId::new("sales-kb-1").unwrap(),
        transport.clone(),
        OperationRegistry::for_backend(backend).unwrap(),
        Duration::from_secs(1),
    );
    let _worker = worker.spawn();

    Mesh {
        transport,
        admin,
        mirror_dir,
    }
}

/// Request with retry while the router's subscriptions come up.
async fn call<Req: Serialize, Reply: DeserializeOwned>(
    transport: &InMemoryTransport,
    subject: &str,
    request: &Req,
) -> Reply {
    let payload = Bytes::from(serde_json::to_vec(request).unwrap());
    for _ in 0..200 {
        match transport
            .request(subject, payload.clone(), Duration::from_secs(3))
            .await
        {
            Ok(raw) => return serde_json::from_slice(&raw).unwrap(),
            Err(TransportError::NoResponders { .. }) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(err) => panic!("request on {subject} failed: {err}"),
        }
    }
    panic!("router never subscribed to {subject}");
}

fn register_agent_body(identity: &str) -> Value {
    json!({
        "identity": identity,
        "version": "1.0.0",
        "capabilities": ["analytics"],
        "operations": ["query", "invoke"],
        "health_endpoint": "http://localhost:9001/health",
    })
}

fn register_kb_body() -> Value {
    json!({
        "kb_id": "sales-kb-1",
        "kb_type": "postgres",
        "endpoint": "postgresql://sales-db:5432/sales",
        "operations": ["sql_query", "execute_sql", "get_schema"],
    })
}

fn kb_query_body(requester: &str, operation: &str) -> Value {
    json!({
        "requester_id": requester,
        "kb_id": "sales-kb-1",
        "operation": operation,
        "params": {"query": "SELECT * FROM customers"},
    })
}

async fn upload_masking_policy(mesh: &Mesh) {
    mesh.admin
        .upload_policy(
            PolicyId::new("kb-access").unwrap(),
            json!({"rules": [
                {
                    "effect": "allow",
                    "principal_id": "marketing-agent-2",
                    "resource_id": "sales-kb-1",
                    "action": "sql_query",
                    "masking_rules": ["customer_email", "customer_phone"],
                },
                {"effect": "deny", "action": "execute_sql", "reason": "write access is not granted"},
            ]})
            .to_string(),
            true,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn authorized_query_masks_sensitive_fields() {
    let mesh = boot().await;
    let _: Value = call(&mesh.transport, subject::AGENT_REGISTER, &register_agent_body("marketing-agent-2")).await;
    let _: Value = call(&mesh.transport, subject::KB_REGISTER, &register_kb_body()).await;
    upload_masking_policy(&mesh).await;

    let reply: GovernedReply = call(
        &mesh.transport,
        subject::KB_QUERY,
        &kb_query_body("marketing-agent-2", "sql_query"),
    )
    .await;

    assert_eq!(reply.status, ReplyStatus::Success);
    let rows = reply.data.as_ref().unwrap()["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row["customer_email"], "***");
        assert_eq!(row["customer_phone"], "***");
        assert_ne!(row["name"], "***");
    }
    let audit = reply.audit.unwrap();
    assert_eq!(audit.fields_masked, ["customer_email", "customer_phone"]);

    let logs: AuditQueryReply = call(
        &mesh.transport,
        subject::AUDIT_QUERY,
        &json!({"event_type": "query", "outcome": "success"}),
    )
    .await;
    assert_eq!(logs.total_count, 1);
    let row = &logs.audit_logs[0];
    assert_eq!(row.source_id(), "marketing-agent-2");
    assert_eq!(row.target_id(), Some("sales-kb-1"));
    assert_eq!(row.masked_fields(), ["customer_email", "customer_phone"]);
}

#[tokio::test]
async fn denied_write_never_touches_the_adapter() {
    let mesh = boot().await;
    let _: Value = call(&mesh.transport, subject::AGENT_REGISTER, &register_agent_body("marketing-agent-2")).await;
    let _: Value = call(&mesh.transport, subject::KB_REGISTER, &register_kb_body()).await;
    upload_masking_policy(&mesh).await;

    let mut adapter_traffic = mesh
        .transport
        .subscribe("sales-kb-1.adapter.query")
        .await
        .unwrap();

    let reply: GovernedReply = call(
        &mesh.transport,
        subject::KB_QUERY,
        &kb_query_body("marketing-agent-2", "execute_sql"),
    )
    .await;

    assert_eq!(reply.status, ReplyStatus::Denied);
    assert_eq!(reply.reason.as_deref(), Some("write access is not granted"));

    let nothing = tokio::time::timeout(Duration::from_millis(50), adapter_traffic.next()).await;
    assert!(nothing.is_err(), "denied request reached the adapter");

    let logs: AuditQueryReply = call(
        &mesh.transport,
        subject::AUDIT_QUERY,
        &json!({"outcome": "denied"}),
    )
    .await;
    assert_eq!(logs.total_count, 1);
    assert_eq!(logs.audit_logs[0].outcome(), AuditOutcome::Denied);
}

#[tokio::test]
async fn unknown_kb_is_reported_without_a_policy_call() {
    let mesh = boot().await;
    let reply: GovernedReply = call(
        &mesh.transport,
        subject::KB_QUERY,
        &json!({
            "requester_id": "marketing-agent-2",
            "kb_id": "nonexistent-kb-999",
            "operation": "sql_query",
            "params": {},
        }),
    )
    .await;

    assert_eq!(reply.status, ReplyStatus::Error);
    assert_eq!(reply.code, Some(ErrorCode::UnknownResource));
    assert_eq!(
        reply.error.as_deref(),
        Some("KB nonexistent-kb-999 not found in registry")
    );
}

#[tokio::test]
async fn duplicate_identity_registers_exactly_once() {
    let mesh = boot().await;
    let first: Value = call(&mesh.transport, subject::AGENT_REGISTER, &register_agent_body("sales-agent-1")).await;
    assert!(first.get("agent_id").is_some());

    let mut second = register_agent_body("sales-agent-1");
    second["version"] = json!("2.0.0");
    let second: Value = call(&mesh.transport, subject::AGENT_REGISTER, &second).await;
    assert_eq!(second["code"], "DUPLICATE");

    let directory: Value = call(
        &mesh.transport,
        subject::DIRECTORY_QUERY,
        &json!({"type": "agents"}),
    )
    .await;
    let agents = directory["agents"].as_array().unwrap();
    let matching: Vec<_> = agents
        .iter()
        .filter(|agent| agent["identity"] == "sales-agent-1")
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0]["version"], "1.0.0");
}

#[tokio::test]
async fn registration_is_announced_to_subscribers() {
    let mesh = boot().await;
    let mut updates = mesh
        .transport
        .subscribe(subject::DIRECTORY_UPDATES)
        .await
        .unwrap();

    let _: Value = call(&mesh.transport, subject::AGENT_REGISTER, &register_agent_body("analytics-agent-4")).await;

    let delivery = tokio::time::timeout(Duration::from_secs(1), updates.next())
        .await
        .expect("no directory update within one round-trip")
        .unwrap();
    let event: Value = serde_json::from_slice(&delivery.payload).unwrap();
    assert_eq!(event["type"], "agent_registered");
    assert_eq!(event["data"]["identity"], "analytics-agent-4");
    assert_eq!(event["data"]["status"], "active");
    assert_eq!(event["data"]["capabilities"][0], "analytics");
}

#[tokio::test]
async fn concurrent_queries_get_independent_audited_replies() {
    let mesh = boot().await;
    for identity in ["agent-a", "agent-b", "agent-c"] {
        let _: Value = call(&mesh.transport, subject::AGENT_REGISTER, &register_agent_body(identity)).await;
    }
    let _: Value = call(&mesh.transport, subject::KB_REGISTER, &register_kb_body()).await;
    mesh.admin
        .upload_policy(
            PolicyId::new("kb-open-read").unwrap(),
            json!({"rules": [{
                "effect": "allow",
                "resource_id": "sales-kb-1",
                "action": "sql_query",
                "masking_rules": ["customer_email"],
            }]})
            .to_string(),
            false,
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for identity in ["agent-a", "agent-b", "agent-c"] {
        let transport = mesh.transport.clone();
        handles.push(tokio::spawn(async move {
            let reply: GovernedReply = call(
                &transport,
                subject::KB_QUERY,
                &kb_query_body(identity, "sql_query"),
            )
            .await;
            reply
        }));
    }

    let mut payloads = Vec::new();
    for handle in handles {
        let reply = handle.await.unwrap();
        assert_eq!(reply.status, ReplyStatus::Success);
        payloads.push(reply.data.unwrap());
    }
    assert_eq!(payloads[0], payloads[1]);
    assert_eq!(payloads[1], payloads[2]);
    assert_eq!(payloads[0]["rows"][0]["customer_email"], "***");

    let logs: AuditQueryReply = call(
        &mesh.transport,
        subject::AUDIT_QUERY,
        &json!({"event_type": "query", "outcome": "success"}),
    )
    .await;
    assert_eq!(logs.total_count, 3);
    let mut request_ids: Vec<String> = logs
        .audit_logs
        .iter()
        .map(|row| {
            row.request_metadata().unwrap()["request_id"]
                .as_str()
                .unwrap()
                .to_owned()
        })
        .collect();
    request_ids.sort();
    request_ids.dedup();
    assert_eq!(request_ids.len(), 3);
}

#[tokio::test]
async fn audit_query_honors_time_windows_and_limits() {
    let mesh = boot().await;
    let _: Value = call(&mesh.transport, subject::KB_REGISTER, &register_kb_body()).await;

    // Inverted range: empty success.
    let logs: AuditQueryReply = call(
        &mesh.transport,
        subject::AUDIT_QUERY,
        &json!({
            "start_time": "2030-01-01T00:00:00Z",
            "end_time": "2020-01-01T00:00:00Z",
        }),
    )
    .await;
    assert_eq!(logs.total_count, 0);
    assert!(logs.audit_logs.is_empty());

    // Zero limit: counts preserved, rows empty.
    let logs: AuditQueryReply = call(
        &mesh.transport,
        subject::AUDIT_QUERY,
        &json!({"limit": 0}),
    )
    .await;
    assert!(logs.audit_logs.is_empty());
    assert_eq!(logs.total_count, 1);
}

#[tokio::test]
async fn governed_invocation_completes_with_tracking() {
    let mesh = boot().await;
    let _: Value = call(&mesh.transport, subject::AGENT_REGISTER, &register_agent_body("coordinator-agent")).await;
    let target: Value = call(&mesh.transport, subject::AGENT_REGISTER, &register_agent_body("worker-agent")).await;
    let target_id = target["agent_id"].as_str().unwrap().to_owned();

    mesh.admin
        .upload_policy(
            PolicyId::new("invoke-access").unwrap(),
            json!({"rules": [{
                "effect": "allow",
                "resource_type": "agent",
                "action": "invoke",
                "masking_rules": ["api_key"],
            }]})
            .to_string(),
            false,
        )
        .await
        .unwrap();

    // A live target agent answering on its inbox subject.
    let inbox = format!("agent.{target_id}");
    let mut inbound = mesh.transport.subscribe(&inbox).await.unwrap();
    let responder = mesh.transport.clone();
    tokio::spawn(async move {
        while let Some(delivery) = inbound.next().await {
            let request: Value = serde_json::from_slice(&delivery.payload).unwrap();
            let reply = json!({
                "echoed": request["payload"],
                "api_key": "sk-secret",
            });
            responder
                .respond(&delivery, Bytes::from(serde_json::to_vec(&reply).unwrap()))
                .await
                .unwrap();
        }
    });

    let mut completions = mesh
        .transport
        .subscribe(subject::ROUTING_COMPLETION)
        .await
        .unwrap();

    let reply: Value = call(
        &mesh.transport,
        subject::AGENT_INVOKE,
        &json!({
            "source_agent_id": "coordinator-agent",
            "target_agent_id": "worker-agent",
            "operation": "invoke",
            "payload": {"task": "summarize"},
        }),
    )
    .await;

    assert_eq!(reply["status"], "success");
    assert_eq!(reply["state"], "completed");
    let tracking_id = reply["tracking_id"].as_str().unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(1), completions.next())
        .await
        .expect("no completion event")
        .unwrap();
    let completion: Value = serde_json::from_slice(&delivery.payload).unwrap();
    assert_eq!(completion["tracking_id"], tracking_id);
    assert_eq!(completion["state"], "completed");
    // The target's sensitive field is masked in the published completion.
    assert_eq!(completion["data"]["api_key"], "***");

    let logs: AuditQueryReply = call(
        &mesh.transport,
        subject::AUDIT_QUERY,
        &json!({"event_type": "invoke", "source_id": "coordinator-agent"}),
    )
    .await;
    // queued, processing, completed.
    assert_eq!(logs.total_count, 3);
    assert!(logs.audit_logs.iter().all(|row| row.target_id() == Some("worker-agent")));
}

#[tokio::test]
async fn policy_admin_serves_over_transport() {
    let mesh = boot().await;
    let body = json!({"rules": [{"effect": "allow", "resource_id": "sales-kb-1"}]}).to_string();

    let uploaded: Value = call(
        &mesh.transport,
        subject::POLICY_UPLOAD,
        &json!({"policy_id": "kb-access", "body": body}),
    )
    .await;
    assert_eq!(uploaded["policy_id"], "kb-access");
    assert_eq!(uploaded["active"], true);
    // persist defaults on, so the mirror file lands on disk.
    assert!(mesh.mirror_dir.join("kb-access.rego").exists());

    let listed: Value = call(&mesh.transport, subject::POLICY_LIST, &json!({})).await;
    assert_eq!(listed["total_count"], 1);
    assert_eq!(listed["policies"][0]["policy_id"], "kb-access");

    let fetched: Value = call(
        &mesh.transport,
        subject::POLICY_GET,
        &json!({"policy_id": "kb-access"}),
    )
    .await;
    assert_eq!(fetched["body"], body);

    let rejected: Value = call(
        &mesh.transport,
        subject::POLICY_UPLOAD,
        &json!({"policy_id": "broken", "body": "package mesh", "persist": true}),
    )
    .await;
    assert_eq!(rejected["code"], "VALIDATION");
    assert!(!mesh.mirror_dir.join("broken.rego").exists());

    let deleted: Value = call(
        &mesh.transport,
        subject::POLICY_DELETE,
        &json!({"policy_id": "kb-access"}),
    )
    .await;
    assert_eq!(deleted["success"], true);
    assert!(!mesh.mirror_dir.join("kb-access.rego").exists());

    let missing: Value = call(
        &mesh.transport,
        subject::POLICY_GET,
        &json!({"policy_id": "kb-access"}),
    )
    .await;
    assert_eq!(missing["code"], "UNKNOWN_RESOURCE");
}

#[tokio::test]
async fn mesh_health_answers_over_transport() {
    let mesh = boot().await;
    let health: Value = call(&mesh.transport, subject::HEALTH, &json!({})).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["components"]["store"], "ok");
}
