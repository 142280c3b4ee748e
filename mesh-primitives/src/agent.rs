//! Agent registry records.

use chrono::{DateTime, Utc};
use http::Uri;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::ResourceStatus;
use crate::vocabulary::validate_agent_operations;
use crate::{AgentId, Error};

/// Registry row describing an agent known to the mesh.
///
/// `identity` is the stable, caller-chosen name enforced unique by the
/// registry; `agent_id` is assigned at registration time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentRecord {
    agent_id: AgentId,
    identity: String,
    version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    operations: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    schemas: Value,
    health_endpoint: String,
    status: ResourceStatus,
    registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    metadata: Value,
}

impl AgentRecord {
    /// Starts building an [`AgentRecord`] for the supplied identity.
    #[must_use]
    pub fn builder(identity: impl Into<String>) -> AgentRecordBuilder {
        AgentRecordBuilder {
            identity: identity.into(),
            version: None,
            capabilities: Vec::new(),
            operations: Vec::new(),
            schemas: Value::Null,
            health_endpoint: None,
            metadata: Value::Null,
        }
    }

    /// Returns the registry-assigned identifier.
    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Returns the unique identity string.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the agent's advertised version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the advertised capability labels, insertion-ordered.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns the validated operation names.
    #[must_use]
    pub fn operations(&self) -> &[String] {
        &self.operations
    }

    /// Returns the opaque operation schemas.
    #[must_use]
    pub const fn schemas(&self) -> &Value {
        &self.schemas
    }

    /// Returns the HTTP endpoint probed by the health monitor.
    #[must_use]
    pub fn health_endpoint(&self) -> &str {
        &self.health_endpoint
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

    /// Returns the last observed heartbeat, if any.
    #[must_use]
    pub const fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat
    }

    /// Returns caller-supplied metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Returns a copy with the supplied status.
    #[must_use]
    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns a copy stamped with a heartbeat observation.
    #[must_use]
    pub fn with_heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.last_heartbeat = Some(at);
        self
    }

    /// Returns a copy with the capability set replaced.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = dedup_preserving_order(capabilities);
        self
    }
}

/// Builder for [`AgentRecord`].
#[derive(Debug)]
pub struct AgentRecordBuilder {
    identity: String,
    version: Option<String>,
    capabilities: Vec<String>,
    operations: Vec<String>,
    schemas: Value,
    health_endpoint: Option<String>,
    metadata: Value,
}

impl AgentRecordBuilder {
    /// Sets the semantic version string.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Replaces the capability set, preserving first-seen order.
    #[must_use]
    pub fn capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = dedup_preserving_order(capabilities);
        self
    }

    /// Replaces the operation set.
    #[must_use]
    pub fn operations(mut self, operations: Vec<String>) -> Self {
        self.operations = dedup_preserving_order(operations);
        self
    }

    /// Attaches opaque operation schemas.
    #[must_use]
    pub fn schemas(mut self, schemas: Value) -> Self {
        self.schemas = schemas;
        self
    }

    /// Sets the health endpoint probed by the monitor.
    #[must_use]
    pub fn health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_endpoint = Some(endpoint.into());
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
    /// A fresh `agent_id` is assigned, status starts `active`, and
    /// `registered_at` is stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for empty identity/version or an
    /// unparseable health endpoint, and [`Error::UnknownOperation`] when an
    /// operation falls outside the agent vocabulary.
    pub fn build(self) -> crate::Result<AgentRecord> {
        if self.identity.trim().is_empty() {
            return Err(Error::invalid_record("agent identity cannot be empty"));
        }
        let version = self
            .version
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::invalid_record("agent version cannot be empty"))?;
        let health_endpoint = self
            .health_endpoint
            .ok_or_else(|| Error::invalid_record("agent health endpoint is required"))?;
        if health_endpoint.parse::<Uri>().is_err() {
            return Err(Error::invalid_record(format!(
                "health endpoint `{health_endpoint}` is not a valid URL"
            )));
        }
        validate_agent_operations(&self.operations)?;

        Ok(AgentRecord {
            agent_id: AgentId::random(),
            identity: self.identity,
            version,
            capabilities: self.capabilities,
            operations: self.operations,
            schemas: self.schemas,
            health_endpoint,
            status: ResourceStatus::Active,
            registered_at: Utc::now(),
            last_heartbeat: None,
            metadata: self.metadata,
        })
    }
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> AgentRecordBuilder {
        AgentRecord::builder("marketing-agent-2")
            .version("1.0.0")
            .capabilities(vec!["analytics".into(), "analytics".into(), "search".into()])
            .operations(vec!["query".into(), "invoke".into()])
            .health_endpoint("http://localhost:9001/health")
    }

    #[test]
    fn builds_active_record_with_fresh_id() {
        let record = builder().build().unwrap();
        assert_eq!(record.identity(), "marketing-agent-2");
        assert_eq!(record.status(), ResourceStatus::Active);
        assert_eq!(record.capabilities(), ["analytics", "search"]);
        assert!(record.last_heartbeat().is_none());
    }

    #[test]
    fn rejects_bad_endpoint_and_unknown_operation() {
        let err = builder().health_endpoint("not a url").build().unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));

        let err = builder()
            .operations(vec!["query".into(), "teleport".into()])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownOperation { .. }));
    }

    #[test]
    fn rejects_empty_identity() {
        let err = AgentRecord::builder("  ")
            .version("1.0.0")
            .health_endpoint("http://localhost:9001/health")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));
    }
}
