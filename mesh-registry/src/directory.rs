//! Filterable, read-only view over the registry.

use std::sync::Arc;

use mesh_primitives::{AgentRecord, KbRecord, KbType, ResourceStatus};
use mesh_store::{AgentFilter, KbFilter, MeshStore, RegistryStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::RegistryResult;

/// Default row cap when a query omits `limit`.
pub const DEFAULT_DIRECTORY_LIMIT: usize = 100;

/// Which record kinds a directory query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryScope {
    /// Only agents.
    Agents,
    /// Only knowledge bases.
    Kbs,
}

/// Query payload received on `mesh.directory.query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryQueryRequest {
    /// Restrict to one record kind; absent means both.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<DirectoryScope>,
    /// Restrict agents to those advertising this capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_filter: Option<String>,
    /// Restrict knowledge bases to this backend type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_type_filter: Option<KbType>,
    /// Restrict to this status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_filter: Option<ResourceStatus>,
    /// Advisory row cap per record kind; defaults to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Reply sent for `mesh.directory.query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryReply {
    /// Matching agents, present when the scope includes agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<AgentRecord>>,
    /// Matching knowledge bases (credentials stripped), present when the
    /// scope includes kbs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kbs: Option<Vec<KbRecord>>,
    /// Total matches across the selected kinds, before the limit.
    pub total_count: usize,
    /// Echo of the filters that were actually set.
    pub filters_applied: Value,
}

/// Serves `mesh.directory.query`.
pub struct DirectoryService {
    store: Arc<dyn MeshStore>,
}

impl DirectoryService {
    /// Creates a directory over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MeshStore>) -> Self {
        Self { store }
    }

    /// Runs a directory query.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn query(&self, request: &DirectoryQueryRequest) -> RegistryResult<DirectoryReply> {
        let limit = request.limit.unwrap_or(DEFAULT_DIRECTORY_LIMIT);
        let mut total_count = 0;

        let agents = if request.scope.is_none_or(|scope| scope == DirectoryScope::Agents) {
            let filter = AgentFilter {
                identity: None,
                capability: request.capability_filter.clone(),
                status: request.status_filter,
                limit: Some(limit),
            };
            let (rows, total) = self.store.list_agents(&filter).await?;
            total_count += total;
            Some(rows)
        } else {
            None
        };

        let kbs = if request.scope.is_none_or(|scope| scope == DirectoryScope::Kbs) {
            let filter = KbFilter {
                kb_type: request.kb_type_filter,
                status: request.status_filter,
                limit: Some(limit),
            };
            let (rows, total) = self.store.list_kbs(&filter).await?;
            total_count += total;
            Some(rows.iter().map(KbRecord::sanitized).collect())
        } else {
            None
        };

        Ok(DirectoryReply {
            agents,
            kbs,
            total_count,
            filters_applied: applied_filters(request),
        })
    }
}

impl std::fmt::Debug for DirectoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryService").finish_non_exhaustive()
    }
}

fn applied_filters(request: &DirectoryQueryRequest) -> Value {
    let mut applied = Map::new();
    if let Some(scope) = request.scope {
        applied.insert(
            "type".into(),
            match scope {
                DirectoryScope::Agents => "agents".into(),
                DirectoryScope::Kbs => "kbs".into(),
            },
        );
    }
    if let Some(capability) = &request.capability_filter {
        applied.insert("capability_filter".into(), capability.clone().into());
    }
    if let Some(kb_type) = request.kb_type_filter {
        applied.insert("kb_type_filter".into(), kb_type.as_str().into());
    }
    if let Some(status) = request.status_filter {
        applied.insert("status_filter".into(), status.as_str().into());
    }
    if let Some(limit) = request.limit {
        applied.insert("limit".into(), limit.into());
    }
    Value::Object(applied)
}
