//! Directory-update events published on `mesh.directory.updates`.

use chrono::{DateTime, Utc};
use mesh_primitives::{AgentRecord, KbRecord, ResourceStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Kind of registry change being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryEventKind {
    /// A new agent row was committed.
    AgentRegistered,
    /// A new knowledge-base row was committed.
    KbRegistered,
    /// An existing row changed status (including removal, which is
    /// announced as a transition to `offline`).
    StatusChanged,
}

/// One notification on `mesh.directory.updates`.
///
/// `data` carries the affected record with credentials stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEvent {
    /// Change kind.
    #[serde(rename = "type")]
    pub kind: DirectoryEventKind,
    /// When the change was announced.
    pub timestamp: DateTime<Utc>,
    /// The affected record, credentials omitted.
    pub data: Value,
}

impl DirectoryEvent {
    /// Announces a committed agent registration.
    #[must_use]
    pub fn agent_registered(record: &AgentRecord) -> Self {
        Self {
            kind: DirectoryEventKind::AgentRegistered,
            timestamp: Utc::now(),
            data: json!(record),
        }
    }

    /// Announces a committed knowledge-base registration.
    #[must_use]
    pub fn kb_registered(record: &KbRecord) -> Self {
        Self {
            kind: DirectoryEventKind::KbRegistered,
            timestamp: Utc::now(),
            data: json!(record.sanitized()),
        }
    }

    /// Announces an agent status change.
    #[must_use]
    pub fn agent_status_changed(record: &AgentRecord) -> Self {
        Self {
            kind: DirectoryEventKind::StatusChanged,
            timestamp: Utc::now(),
            data: json!(record),
        }
    }

    /// Announces a knowledge-base status change.
    #[must_use]
    pub fn kb_status_changed(record: &KbRecord) -> Self {
        Self {
            kind: DirectoryEventKind::StatusChanged,
            timestamp: Utc::now(),
            data: json!(record.sanitized()),
        }
    }

    /// Announces a removal as a terminal `offline` transition.
    #[must_use]
    pub fn removed(kind_label: &str, id: &str) -> Self {
        Self {
            kind: DirectoryEventKind::StatusChanged,
            timestamp: Utc::now(),
            data: json!({
                "kind": kind_label,
                "id": id,
                "status": ResourceStatus::Offline,
                "removed": true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_primitives::{KbId, KbType};
    use serde_json::json as j;

    #[test]
    fn kb_events_never_carry_credentials() {
        let record = KbRecord::builder(KbId::new("sales-kb-1").unwrap(), KbType::Postgres)
            .endpoint("postgresql://db:5432/sales")
            .operations(vec!["sql_query".into()])
            .credentials(j!({"password": "hunter2"}))
            .build()
            .unwrap();

        let event = DirectoryEvent::kb_registered(&record);
        assert!(event.data.get("credentials").is_none());

        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "kb_registered");
    }
}
