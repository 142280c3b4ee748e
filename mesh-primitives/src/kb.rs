//! Knowledge-base registry records.

use chrono::{DateTime, Utc};
use http::Uri;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::ResourceStatus;
use crate::vocabulary::validate_kb_operations;
use crate::{Error, KbId};

/// Backend family fronted by an adapter worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KbType {
    /// Relational backend speaking SQL.
    Postgres,
    /// Graph backend speaking Cypher.
    Neo4j,
}

impl KbType {
    /// Returns the wire representation of the backend type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Neo4j => "neo4j",
        }
    }
}

impl std::fmt::Display for KbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KbType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "neo4j" => Ok(Self::Neo4j),
            other => Err(Error::invalid_record(format!(
                "unknown kb type `{other}`; expected one of: postgres, neo4j"
            ))),
        }
    }
}

/// Registry row describing a knowledge base fronted by an adapter worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KbRecord {
    kb_id: KbId,
    kb_type: KbType,
    endpoint: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    operations: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credentials: Option<Value>,
    status: ResourceStatus,
    registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_health_check: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    probe_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    metadata: Value,
}

impl KbRecord {
    /// Starts building a [`KbRecord`].
    #[must_use]
    pub fn builder(kb_id: KbId, kb_type: KbType) -> KbRecordBuilder {
        KbRecordBuilder {
            kb_id,
            kb_type,
            endpoint: None,
            operations: Vec::new(),
            schema: Value::Null,
            credentials: None,
            metadata: Value::Null,
        }
    }

    /// Returns the knowledge-base identifier.
    #[must_use]
    pub const fn kb_id(&self) -> &KbId {
        &self.kb_id
    }

    /// Returns the backend type.
    #[must_use]
    pub const fn kb_type(&self) -> KbType {
        self.kb_type
    }

    /// Returns the driver URI of the backend.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the validated operation names.
    #[must_use]
    pub fn operations(&self) -> &[String] {
        &self.operations
    }

    /// Returns the opaque backend schema description.
    #[must_use]
    pub const fn schema(&self) -> &Value {
        &self.schema
    }

    /// Returns stored credentials, if any. Never exposed on query surfaces.
    #[must_use]
    pub const fn credentials(&self) -> Option<&Value> {
        self.credentials.as_ref()
    }

    /// Returns the current health status.
    #[must_use]
    pub const fn status(&self) -> ResourceStatus {
        self.status
    }

    /// Returns the registration timestamp.
    #[must_use]
    pub const fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Returns the most recent health-check timestamp.
    #[must_use]
    pub const fn last_health_check(&self) -> Option<DateTime<Utc>> {
        self.last_health_check
    }

    /// Returns the latency of the initial connectivity probe, when recorded.
    #[must_use]
    pub const fn probe_latency_ms(&self) -> Option<u64> {
        self.probe_latency_ms
    }

    /// Returns caller-supplied metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Returns a copy safe for directory replies and pub/sub events:
    /// identical except that credentials are stripped.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let mut copy = self.clone();
        copy.credentials = None;
        copy
    }

    /// Returns a copy with the supplied status.
    #[must_use]
    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns a copy stamped with a health-check observation.
    #[must_use]
    pub fn with_health_check(mut self, at: DateTime<Utc>) -> Self {
        self.last_health_check = Some(at);
        self
    }

    /// Returns a copy carrying the initial connectivity probe latency.
    #[must_use]
    pub fn with_probe_latency(mut self, latency_ms: u64) -> Self {
        self.probe_latency_ms = Some(latency_ms);
        self
    }
}

/// Builder for [`KbRecord`].
#[derive(Debug)]
pub struct KbRecordBuilder {
    kb_id: KbId,
    kb_type: KbType,
    endpoint: Option<String>,
    operations: Vec<String>,
    schema: Value,
    credentials: Option<Value>,
    metadata: Value,
}

impl KbRecordBuilder {
    /// Sets the backend driver URI.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replaces the operation set.
    #[must_use]
    pub fn operations(mut self, operations: Vec<String>) -> Self {
        self.operations = operations;
        self
    }

    /// Attaches an opaque schema description.
    #[must_use]
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Attaches opaque credentials handed through to the adapter worker.
    #[must_use]
    pub fn credentials(mut self, credentials: Value) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Attaches caller-supplied metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Validates the accumulated fields and produces the record.
    ///
    /// Status starts `active`; the registry downgrades it to `offline` when
    /// the initial connectivity probe fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for a missing or unparseable
    /// endpoint, and [`Error::UnknownOperation`] when an operation falls
    /// outside the backend vocabulary.
    pub fn build(self) -> crate::Result<KbRecord> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::invalid_record("kb endpoint is required"))?;
        if endpoint.parse::<Uri>().is_err() {
            return Err(Error::invalid_record(format!(
                "kb endpoint `{endpoint}` is not a valid driver URI"
            )));
        }
        validate_kb_operations(self.kb_type, &self.operations)?;

        Ok(KbRecord {
            kb_id: self.kb_id,
            kb_type: self.kb_type,
            endpoint,
            operations: self.operations,
            schema: self.schema,
            credentials: self.credentials,
            status: ResourceStatus::Active,
            registered_at: Utc::now(),
            last_health_check: None,
            probe_latency_ms: None,
            metadata: self.metadata,
        })
    }
}
