//! PostgreSQL store backend.
//!
//! Transactional source of truth for multi-process deployments. Schema
//! creation is migration-versioned through the `schema_migrations` table;
//! uniqueness of `agents.identity` and `knowledge_bases.kb_id` is enforced
//! by row-level constraints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mesh_primitives::{
    AgentId, AgentRecord, AuditEvent, AuditFilter, KbId, KbRecord, PolicyId, PolicyRecord,
    ResourceStatus,
};
use serde_json::{Map, Value, json};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::traits::{AgentFilter, AuditStore, KbFilter, PolicyStore, RegistryStore};
use crate::{StoreError, StoreResult};

const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        r"
        CREATE TABLE IF NOT EXISTS agents (
            agent_id UUID PRIMARY KEY,
            identity TEXT NOT NULL UNIQUE,
            version TEXT NOT NULL,
            capabilities JSONB NOT NULL DEFAULT '[]'::jsonb,
            operations JSONB NOT NULL DEFAULT '[]'::jsonb,
            schemas JSONB,
            health_endpoint TEXT NOT NULL,
            status TEXT NOT NULL,
            registered_at TIMESTAMPTZ NOT NULL,
            last_heartbeat TIMESTAMPTZ,
            metadata JSONB
        )
        ",
    ),
    (
        2,
        r"
        CREATE TABLE IF NOT EXISTS knowledge_bases (
            kb_id TEXT PRIMARY KEY,
            kb_type TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            operations JSONB NOT NULL DEFAULT '[]'::jsonb,
            schema JSONB,
            credentials JSONB,
            status TEXT NOT NULL,
            registered_at TIMESTAMPTZ NOT NULL,
            last_health_check TIMESTAMPTZ,
            probe_latency_ms BIGINT,
            metadata JSONB
        )
        ",
    ),
    (
        3,
        r"
        CREATE TABLE IF NOT EXISTS policies (
            policy_id TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            precedence INTEGER NOT NULL DEFAULT 0,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            metadata JSONB
        )
        ",
    ),
    (
        4,
        r"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id UUID PRIMARY KEY,
            event_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            target_id TEXT,
            outcome TEXT NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL,
            request_metadata JSONB,
            policy_decision JSONB,
            masked_fields JSONB NOT NULL DEFAULT '[]'::jsonb,
            full_request JSONB,
            full_response JSONB,
            provenance_chain JSONB NOT NULL DEFAULT '[]'::jsonb
        );
        CREATE INDEX IF NOT EXISTS audit_logs_query_idx
            ON audit_logs (event_type, timestamp, source_id, target_id, outcome)
        ",
    ),
];

/// Store backed by PostgreSQL through `sqlx`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects to the database and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or migration failure.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|err| StoreError::backend(format!("postgres connect failed: {err}")))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wraps an existing pool and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on migration failure.
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        for &(version, ddl) in MIGRATIONS {
            let applied: Option<i64> =
                sqlx::query_scalar("SELECT version FROM schema_migrations WHERE version = $1")
                    .bind(version)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_err)?;
            if applied.is_some() {
                continue;
            }
            sqlx::raw_sql(ddl).execute(&self.pool).await.map_err(db_err)?;
            sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)")
                .bind(version)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            info!(version, "applied schema migration");
        }
        Ok(())
    }
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::backend(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn insert_opt(doc: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        if !value.is_null() {
            doc.insert(key.to_owned(), value);
        }
    }
}

fn agent_from_row(row: &PgRow) -> StoreResult<AgentRecord> {
    let mut doc = Map::new();
    doc.insert("agent_id".into(), json!(row.try_get::<Uuid, _>("agent_id").map_err(db_err)?));
    doc.insert("identity".into(), json!(row.try_get::<String, _>("identity").map_err(db_err)?));
    doc.insert("version".into(), json!(row.try_get::<String, _>("version").map_err(db_err)?));
    doc.insert(
        "capabilities".into(),
        row.try_get::<Value, _>("capabilities").map_err(db_err)?,
    );
    doc.insert(
        "operations".into(),
        row.try_get::<Value, _>("operations").map_err(db_err)?,
    );
    insert_opt(&mut doc, "schemas", row.try_get::<Option<Value>, _>("schemas").map_err(db_err)?);
    doc.insert(
        "health_endpoint".into(),
        json!(row.try_get::<String, _>("health_endpoint").map_err(db_err)?),
    );
    doc.insert("status".into(), json!(row.try_get::<String, _>("status").map_err(db_err)?));
    doc.insert(
        "registered_at".into(),
        json!(row.try_get::<DateTime<Utc>, _>("registered_at").map_err(db_err)?),
    );
    insert_opt(
        &mut doc,
        "last_heartbeat",
        row.try_get::<Option<DateTime<Utc>>, _>("last_heartbeat")
            .map_err(db_err)?
            .map(|at| json!(at)),
    );
    insert_opt(&mut doc, "metadata", row.try_get::<Option<Value>, _>("metadata").map_err(db_err)?);
    Ok(serde_json::from_value(Value::Object(doc))?)
}

fn kb_from_row(row: &PgRow) -> StoreResult<KbRecord> {
    let mut doc = Map::new();
    doc.insert("kb_id".into(), json!(row.try_get::<String, _>("kb_id").map_err(db_err)?));
    doc.insert("kb_type".into(), json!(row.try_get::<String, _>("kb_type").map_err(db_err)?));
    doc.insert("endpoint".into(), json!(row.try_get::<String, _>("endpoint").map_err(db_err)?));
    doc.insert(
        "operations".into(),
        row.try_get::<Value, _>("operations").map_err(db_err)?,
    );
    insert_opt(&mut doc, "schema", row.try_get::<Option<Value>, _>("schema").map_err(db_err)?);
    insert_opt(
        &mut doc,
        "credentials",
        row.try_get::<Option<Value>, _>("credentials").map_err(db_err)?,
    );
    doc.insert("status".into(), json!(row.try_get::<String, _>("status").map_err(db_err)?));
    doc.insert(
        "registered_at".into(),
        json!(row.try_get::<DateTime<Utc>, _>("registered_at").map_err(db_err)?),
    );
    insert_opt(
        &mut doc,
        "last_health_check",
        row.try_get::<Option<DateTime<Utc>>, _>("last_health_check")
            .map_err(db_err)?
            .map(|at| json!(at)),
    );
    insert_opt(
        &mut doc,
        "probe_latency_ms",
        row.try_get::<Option<i64>, _>("probe_latency_ms")
            .map_err(db_err)?
            .map(|ms| json!(ms)),
    );
    insert_opt(&mut doc, "metadata", row.try_get::<Option<Value>, _>("metadata").map_err(db_err)?);
    Ok(serde_json::from_value(Value::Object(doc))?)
}

fn policy_from_row(row: &PgRow) -> StoreResult<PolicyRecord> {
    let mut doc = Map::new();
    doc.insert("policy_id".into(), json!(row.try_get::<String, _>("policy_id").map_err(db_err)?));
    doc.insert("body".into(), json!(row.try_get::<String, _>("body").map_err(db_err)?));
    doc.insert("precedence".into(), json!(row.try_get::<i32, _>("precedence").map_err(db_err)?));
    doc.insert("active".into(), json!(row.try_get::<bool, _>("active").map_err(db_err)?));
    doc.insert(
        "created_at".into(),
        json!(row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_err)?),
    );
    doc.insert(
        "updated_at".into(),
        json!(row.try_get::<DateTime<Utc>, _>("updated_at").map_err(db_err)?),
    );
    insert_opt(&mut doc, "metadata", row.try_get::<Option<Value>, _>("metadata").map_err(db_err)?);
    Ok(serde_json::from_value(Value::Object(doc))?)
}

fn audit_from_row(row: &PgRow) -> StoreResult<AuditEvent> {
    let mut doc = Map::new();
    doc.insert("id".into(), json!(row.try_get::<Uuid, _>("id").map_err(db_err)?));
    doc.insert("event_type".into(), json!(row.try_get::<String, _>("event_type").map_err(db_err)?));
    doc.insert("source_id".into(), json!(row.try_get::<String, _>("source_id").map_err(db_err)?));
    insert_opt(
        &mut doc,
        "target_id",
        row.try_get::<Option<String>, _>("target_id")
            .map_err(db_err)?
            .map(|id| json!(id)),
    );
    doc.insert("outcome".into(), json!(row.try_get::<String, _>("outcome").map_err(db_err)?));
    doc.insert(
        "timestamp".into(),
        json!(row.try_get::<DateTime<Utc>, _>("timestamp").map_err(db_err)?),
    );
    insert_opt(
        &mut doc,
        "request_metadata",
        row.try_get::<Option<Value>, _>("request_metadata").map_err(db_err)?,
    );
    insert_opt(
        &mut doc,
        "policy_decision",
        row.try_get::<Option<Value>, _>("policy_decision").map_err(db_err)?,
    );
    doc.insert(
        "masked_fields".into(),
        row.try_get::<Value, _>("masked_fields").map_err(db_err)?,
    );
    insert_opt(
        &mut doc,
        "full_request",
        row.try_get::<Option<Value>, _>("full_request").map_err(db_err)?,
    );
    insert_opt(
        &mut doc,
        "full_response",
        row.try_get::<Option<Value>, _>("full_response").map_err(db_err)?,
    );
    doc.insert(
        "provenance_chain".into(),
        row.try_get::<Value, _>("provenance_chain").map_err(db_err)?,
    );
    Ok(serde_json::from_value(Value::Object(doc))?)
}

#[async_trait]
impl RegistryStore for PostgresStore {
    async fn insert_agent(&self, record: &AgentRecord) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO agents (agent_id, identity, version, capabilities, operations, schemas,
                                 health_endpoint, status, registered_at, last_heartbeat, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.agent_id().as_uuid())
        .bind(record.identity())
        .bind(record.version())
        .bind(json!(record.capabilities()))
        .bind(json!(record.operations()))
        .bind(record.schemas().clone())
        .bind(record.health_endpoint())
        .bind(record.status().as_str())
        .bind(record.registered_at())
        .bind(record.last_heartbeat())
        .bind(record.metadata().clone())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Duplicate {
                kind: "agent",
                id: record.identity().to_owned(),
            }),
            Err(err) => Err(db_err(err)),
        }
    }

    async fn get_agent(&self, agent_id: AgentId) -> StoreResult<Option<AgentRecord>> {
        let row = sqlx::query("SELECT * FROM agents WHERE agent_id = $1")
            .bind(agent_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn get_agent_by_identity(&self, identity: &str) -> StoreResult<Option<AgentRecord>> {
        let row = sqlx::query("SELECT * FROM agents WHERE identity = $1")
            .bind(identity)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn list_agents(&self, filter: &AgentFilter) -> StoreResult<(Vec<AgentRecord>, usize)> {
        let where_clause = "($1::TEXT IS NULL OR identity = $1)
              AND ($2::TEXT IS NULL OR capabilities @> jsonb_build_array($2))
              AND ($3::TEXT IS NULL OR status = $3)";
        let identity = filter.identity.as_deref();
        let capability = filter.capability.as_deref();
        let status = filter.status.map(ResourceStatus::as_str);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM agents WHERE {where_clause}"
        ))
        .bind(identity)
        .bind(capability)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let rows = sqlx::query(&format!(
            "SELECT * FROM agents WHERE {where_clause} ORDER BY registered_at LIMIT $4"
        ))
        .bind(identity)
        .bind(capability)
        .bind(status)
        .bind(filter.limit.map(|limit| limit as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let records = rows
            .iter()
            .map(agent_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((records, usize::try_from(total).unwrap_or(0)))
    }

    async fn update_agent_status(
        &self,
        agent_id: AgentId,
        status: ResourceStatus,
    ) -> StoreResult<AgentRecord> {
        let row = sqlx::query("UPDATE agents SET status = $2 WHERE agent_id = $1 RETURNING *")
            .bind(agent_id.as_uuid())
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref()
            .map(agent_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            })
    }

    async fn update_agent_capabilities(
        &self,
        agent_id: AgentId,
        capabilities: Vec<String>,
    ) -> StoreResult<AgentRecord> {
        let row = sqlx::query(
            "UPDATE agents SET capabilities = $2 WHERE agent_id = $1 RETURNING *",
        )
        .bind(agent_id.as_uuid())
        .bind(json!(capabilities))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref()
            .map(agent_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            })
    }

    async fn record_heartbeat(&self, agent_id: AgentId, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE agents SET last_heartbeat = $2 WHERE agent_id = $1")
            .bind(agent_id.as_uuid())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_agent(&self, agent_id: AgentId) -> StoreResult<AgentRecord> {
        let row = sqlx::query("DELETE FROM agents WHERE agent_id = $1 RETURNING *")
            .bind(agent_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref()
            .map(agent_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            })
    }

    async fn insert_kb(&self, record: &KbRecord) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO knowledge_bases (kb_id, kb_type, endpoint, operations, schema,
                                          credentials, status, registered_at, last_health_check,
                                          probe_latency_ms, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.kb_id().as_str())
        .bind(record.kb_type().as_str())
        .bind(record.endpoint())
        .bind(json!(record.operations()))
        .bind(record.schema().clone())
        .bind(record.credentials().cloned())
        .bind(record.status().as_str())
        .bind(record.registered_at())
        .bind(record.last_health_check())
        .bind(record.probe_latency_ms().map(|ms| ms as i64))
        .bind(record.metadata().clone())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Duplicate {
                kind: "kb",
                id: record.kb_id().to_string(),
            }),
            Err(err) => Err(db_err(err)),
        }
    }

    async fn get_kb(&self, kb_id: &KbId) -> StoreResult<Option<KbRecord>> {
        let row = sqlx::query("SELECT * FROM knowledge_bases WHERE kb_id = $1")
            .bind(kb_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(kb_from_row).transpose()
    }

    async fn list_kbs(&self, filter: &KbFilter) -> StoreResult<(Vec<KbRecord>, usize)> {
        let where_clause = "($1::TEXT IS NULL OR kb_type = $1)
              AND ($2::TEXT IS NULL OR status = $2)";
        let kb_type = filter.kb_type.map(mesh_primitives::KbType::as_str);
        let status = filter.status.map(ResourceStatus::as_str);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM knowledge_bases WHERE {where_clause}"
        ))
        .bind(kb_type)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let rows = sqlx::query(&format!(
            "SELECT * FROM knowledge_bases WHERE {where_clause} ORDER BY registered_at LIMIT $3"
        ))
        .bind(kb_type)
        .bind(status)
        .bind(filter.limit.map(|limit| limit as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let records = rows
            .iter()
            .map(kb_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((records, usize::try_from(total).unwrap_or(0)))
    }

    async fn update_kb_status(
        &self,
        kb_id: &KbId,
        status: ResourceStatus,
    ) -> StoreResult<KbRecord> {
        let row = sqlx::query("UPDATE knowledge_bases SET status = $2 WHERE kb_id = $1 RETURNING *")
            .bind(kb_id.as_str())
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref()
            .map(kb_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "kb",
                id: kb_id.to_string(),
            })
    }

    async fn record_kb_health_check(&self, kb_id: &KbId, at: DateTime<Utc>) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE knowledge_bases SET last_health_check = $2 WHERE kb_id = $1")
                .bind(kb_id.as_str())
                .bind(at)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "kb",
                id: kb_id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_kb(&self, kb_id: &KbId) -> StoreResult<KbRecord> {
        let row = sqlx::query("DELETE FROM knowledge_bases WHERE kb_id = $1 RETURNING *")
            .bind(kb_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref()
            .map(kb_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound {
                kind: "kb",
                id: kb_id.to_string(),
            })
    }
}

#[async_trait]
impl PolicyStore for PostgresStore {
    async fn upsert_policy(&self, record: &PolicyRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO policies (policy_id, body, precedence, active, created_at, updated_at, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (policy_id) DO UPDATE
             SET body = EXCLUDED.body,
                 precedence = EXCLUDED.precedence,
                 active = EXCLUDED.active,
                 updated_at = EXCLUDED.updated_at,
                 metadata = EXCLUDED.metadata",
        )
        .bind(record.policy_id().as_str())
        .bind(record.body())
        .bind(record.precedence())
        .bind(record.active())
        .bind(record.created_at())
        .bind(record.updated_at())
        .bind(record.metadata().clone())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_policy(&self, policy_id: &PolicyId) -> StoreResult<Option<PolicyRecord>> {
        let row = sqlx::query("SELECT * FROM policies WHERE policy_id = $1")
            .bind(policy_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(policy_from_row).transpose()
    }

    async fn list_policies(&self) -> StoreResult<Vec<PolicyRecord>> {
        let rows = sqlx::query("SELECT * FROM policies ORDER BY precedence DESC, policy_id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(policy_from_row).collect()
    }

    async fn delete_policy(&self, policy_id: &PolicyId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM policies WHERE policy_id = $1")
            .bind(policy_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditStore for PostgresStore {
    async fn append(&self, event: &AuditEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, event_type, source_id, target_id, outcome, timestamp,
                                     request_metadata, policy_decision, masked_fields,
                                     full_request, full_response, provenance_chain)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(event.id())
        .bind(event.event_type().as_str())
        .bind(event.source_id())
        .bind(event.target_id())
        .bind(event.outcome().as_str())
        .bind(event.timestamp())
        .bind(event.request_metadata().cloned())
        .bind(event.policy_decision().cloned())
        .bind(json!(event.masked_fields()))
        .bind(event.full_request().cloned())
        .bind(event.full_response().cloned())
        .bind(json!(event.provenance_chain()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> StoreResult<(Vec<AuditEvent>, usize)> {
        if let (Some(start), Some(end)) = (filter.start_time, filter.end_time) {
            if start > end {
                return Ok((Vec::new(), 0));
            }
        }

        let where_clause = "($1::TEXT IS NULL OR event_type = $1)
              AND ($2::TEXT IS NULL OR source_id = $2)
              AND ($3::TEXT IS NULL OR target_id = $3)
              AND ($4::TEXT IS NULL OR outcome = $4)
              AND ($5::TIMESTAMPTZ IS NULL OR timestamp >= $5)
              AND ($6::TIMESTAMPTZ IS NULL OR timestamp <= $6)";
        let event_type = filter.event_type.map(mesh_primitives::AuditEventType::as_str);
        let outcome = filter.outcome.map(mesh_primitives::AuditOutcome::as_str);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM audit_logs WHERE {where_clause}"
        ))
        .bind(event_type)
        .bind(filter.source_id.as_deref())
        .bind(filter.target_id.as_deref())
        .bind(outcome)
        .bind(filter.start_time)
        .bind(filter.end_time)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let rows = sqlx::query(&format!(
            "SELECT * FROM audit_logs WHERE {where_clause} ORDER BY timestamp DESC LIMIT $7"
        ))
        .bind(event_type)
        .bind(filter.source_id.as_deref())
        .bind(filter.target_id.as_deref())
        .bind(outcome)
        .bind(filter.start_time)
        .bind(filter.end_time)
        .bind(filter.effective_limit() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let events = rows
            .iter()
            .map(audit_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((events, usize::try_from(total).unwrap_or(0)))
    }
}
