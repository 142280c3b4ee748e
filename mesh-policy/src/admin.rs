//! Policy administration: upload, list, delete, and the on-disk mirror.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mesh_primitives::{PolicyId, PolicyRecord};
use mesh_store::PolicyStore;
use tokio::fs;
use tracing::{info, warn};

use crate::evaluator::{PolicyEvaluator, PolicyResult};

/// Manages policy documents across the evaluator, the policy store, and the
/// `.rego` file mirror.
///
/// Uploads are last-writer-wins; the mirror write is atomic per document
/// (write to a temp file, then rename).
pub struct PolicyAdmin {
    store: Arc<dyn PolicyStore>,
    evaluator: Arc<dyn PolicyEvaluator>,
    mirror_dir: PathBuf,
}

impl PolicyAdmin {
    /// Creates an admin writing mirror files under `mirror_dir`.
    #[must_use]
    pub fn new(
        store: Arc<dyn PolicyStore>,
        evaluator: Arc<dyn PolicyEvaluator>,
        mirror_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            evaluator,
            mirror_dir: mirror_dir.into(),
        }
    }

    /// Returns the mirror directory.
    #[must_use]
    pub fn mirror_dir(&self) -> &Path {
        &self.mirror_dir
    }

    /// Uploads a policy: installs it in the evaluator, persists the record,
    /// and (when `persist` is set) mirrors it to `{policy_id}.rego`.
    ///
    /// # Errors
    ///
    /// Propagates evaluator rejection, store failures, and mirror I/O
    /// errors. The evaluator is updated first so a rejected document never
    /// reaches the store or disk.
    pub async fn upload_policy(
        &self,
        policy_id: PolicyId,
        body: impl Into<String>,
        persist: bool,
    ) -> PolicyResult<PolicyRecord> {
        let record = match self.store.get_policy(&policy_id).await? {
            Some(existing) => existing.update_body(body).map_err(|err| {
                crate::PolicyError::invalid_policy(&policy_id, err.to_string())
            })?,
            None => PolicyRecord::new(policy_id.clone(), body).map_err(|err| {
                crate::PolicyError::invalid_policy(&policy_id, err.to_string())
            })?,
        };

        self.evaluator.install_policy(&record).await?;
        self.store.upsert_policy(&record).await?;

        if persist {
            self.write_mirror(&record).await?;
        }
        info!(policy_id = %record.policy_id(), persist, "policy uploaded");
        Ok(record)
    }

    /// Lists stored policies, ordered by descending precedence.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list_policies(&self) -> PolicyResult<Vec<PolicyRecord>> {
        Ok(self.store.list_policies().await?)
    }

    /// Fetches a stored policy record.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get_policy(&self, policy_id: &PolicyId) -> PolicyResult<Option<PolicyRecord>> {
        Ok(self.store.get_policy(policy_id).await?)
    }

    /// Fetches the raw body of a stored policy.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get_policy_content(&self, policy_id: &PolicyId) -> PolicyResult<Option<String>> {
        Ok(self
            .store
            .get_policy(policy_id)
            .await?
            .map(|record| record.body().to_owned()))
    }

    /// Deletes a policy from the evaluator, the store, and the mirror.
    ///
    /// Returns whether a stored record was removed.
    ///
    /// # Errors
    ///
    /// Propagates evaluator and store failures. A missing mirror file is
    /// not an error.
    pub async fn delete_policy(&self, policy_id: &PolicyId) -> PolicyResult<bool> {
        self.evaluator.remove_policy(policy_id).await?;
        let removed = self.store.delete_policy(policy_id).await?;

        let path = self.mirror_dir.join(policy_id.rego_file_name());
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(policy_id = %policy_id, ?err, "failed to remove policy mirror file");
            }
        }
        info!(policy_id = %policy_id, removed, "policy deleted");
        Ok(removed)
    }

    async fn write_mirror(&self, record: &PolicyRecord) -> PolicyResult<()> {
        fs::create_dir_all(&self.mirror_dir).await?;
        let target = self.mirror_dir.join(record.policy_id().rego_file_name());
        let staging = self
            .mirror_dir
            .join(format!(".{}.tmp", record.policy_id().rego_file_name()));
        fs::write(&staging, record.body().as_bytes()).await?;
        fs::rename(&staging, &target).await?;
        Ok(())
    }
}

impl std::fmt::Debug for PolicyAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyAdmin")
            .field("mirror_dir", &self.mirror_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleBasedEvaluator;
    use mesh_store::MemoryStore;
    use serde_json::json;
    use uuid::Uuid;

    fn mirror_dir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("policy-mirror-{}", Uuid::new_v4()));
        path
    }

    fn admin(dir: &Path) -> PolicyAdmin {
        PolicyAdmin::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RuleBasedEvaluator::new()),
            dir,
        )
    }

    #[tokio::test]
    async fn upload_persists_record_and_mirror() {
        let dir = mirror_dir();
        let admin = admin(&dir);
        let body = json!({"rules": [{"effect": "allow"}]}).to_string();

        let record = admin
            .upload_policy(PolicyId::new("kb-access").unwrap(), body.clone(), true)
            .await
            .unwrap();
        assert_eq!(record.body(), body);

        let mirrored = std::fs::read_to_string(dir.join("kb-access.rego")).unwrap();
        assert_eq!(mirrored, body);

        let content = admin
            .get_policy_content(&PolicyId::new("kb-access").unwrap())
            .await
            .unwrap();
        assert_eq!(content.as_deref(), Some(body.as_str()));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn re_upload_replaces_body() {
        let dir = mirror_dir();
        let admin = admin(&dir);
        let id = PolicyId::new("kb-access").unwrap();

        admin
            .upload_policy(id.clone(), json!({"rules": []}).to_string(), false)
            .await
            .unwrap();
        let second = json!({"rules": [{"effect": "deny"}]}).to_string();
        let record = admin
            .upload_policy(id.clone(), second.clone(), false)
            .await
            .unwrap();
        assert_eq!(record.body(), second);
        assert_eq!(admin.list_policies().await.unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn rejected_document_never_reaches_store() {
        let dir = mirror_dir();
        let admin = admin(&dir);
        let id = PolicyId::new("broken").unwrap();

        let err = admin
            .upload_policy(id.clone(), "package mesh", true)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::PolicyError::InvalidPolicy { .. }));
        assert!(admin.get_policy(&id).await.unwrap().is_none());
        assert!(!dir.join("broken.rego").exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn delete_removes_everything() {
        let dir = mirror_dir();
        let admin = admin(&dir);
        let id = PolicyId::new("kb-access").unwrap();

        admin
            .upload_policy(id.clone(), json!({"rules": []}).to_string(), true)
            .await
            .unwrap();
        assert!(admin.delete_policy(&id).await.unwrap());
        assert!(!dir.join("kb-access.rego").exists());
        assert!(!admin.delete_policy(&id).await.unwrap());

        let _ = std::fs::remove_dir_all(dir);
    }
}
