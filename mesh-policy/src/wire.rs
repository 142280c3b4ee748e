//! Wire-level structures for the policy-admin subjects.

use chrono::{DateTime, Utc};
use mesh_primitives::{PolicyId, PolicyRecord};
use serde::{Deserialize, Serialize};

/// Upload payload received on `mesh.policy.upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPolicyRequest {
    /// Identifier of the document (also the mirror file stem).
    pub policy_id: String,
    /// Policy-language source text.
    pub body: String,
    /// Whether to mirror the document to `{policy_id}.rego` on disk.
    #[serde(default = "default_persist")]
    pub persist: bool,
}

fn default_persist() -> bool {
    true
}

/// Acknowledgement for an accepted upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPolicyReply {
    /// Echoed policy identifier.
    pub policy_id: PolicyId,
    /// Whether the document participates in evaluation.
    pub active: bool,
    /// Precedence used to order overlapping policies.
    pub precedence: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl UploadPolicyReply {
    /// Builds the reply from a stored record.
    #[must_use]
    pub fn from_record(record: &PolicyRecord) -> Self {
        Self {
            policy_id: record.policy_id().clone(),
            active: record.active(),
            precedence: record.precedence(),
            created_at: record.created_at(),
            updated_at: record.updated_at(),
        }
    }
}

/// Reply sent for `mesh.policy.list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyListReply {
    /// Stored documents, ordered by descending precedence.
    pub policies: Vec<PolicyRecord>,
    /// Number of stored documents.
    pub total_count: usize,
}

/// Read payload received on `mesh.policy.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPolicyRequest {
    /// Identifier of the document to fetch.
    pub policy_id: String,
}

/// Removal payload received on `mesh.policy.delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePolicyRequest {
    /// Identifier of the document to remove.
    pub policy_id: String,
}

/// Acknowledgement for a removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePolicyReply {
    /// Whether a stored document was removed.
    pub success: bool,
}
