//! TTL-bounded decision cache keyed by the full input fingerprint.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mesh_primitives::{PolicyId, PolicyRecord};
use tracing::trace;

use crate::decision::{DecisionInput, PolicyDecision};
use crate::evaluator::{PolicyEvaluator, PolicyResult};

/// Caching wrapper around any [`PolicyEvaluator`].
///
/// Entries expire after the configured TTL, and the whole cache is dropped
/// whenever a policy is installed or removed, so a stale allow can never
/// outlive the policy change that revoked it.
pub struct CachingEvaluator {
    inner: Arc<dyn PolicyEvaluator>,
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, PolicyDecision)>>,
}

impl CachingEvaluator {
    /// Wraps `inner` with a cache holding decisions for `ttl`.
    #[must_use]
    pub fn new(inner: Arc<dyn PolicyEvaluator>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn lookup(&self, fingerprint: &str) -> Option<PolicyDecision> {
        let guard = self.entries.read().expect("decision cache poisoned");
        let (inserted_at, decision) = guard.get(fingerprint)?;
        if inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(decision.clone())
    }

    fn store(&self, fingerprint: String, decision: &PolicyDecision) {
        let mut guard = self.entries.write().expect("decision cache poisoned");
        guard.insert(fingerprint, (Instant::now(), decision.clone()));
    }

    fn invalidate(&self) {
        let mut guard = self.entries.write().expect("decision cache poisoned");
        guard.clear();
    }
}

impl std::fmt::Debug for CachingEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingEvaluator")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PolicyEvaluator for CachingEvaluator {
    async fn evaluate(&self, input: &DecisionInput) -> PolicyResult<PolicyDecision> {
        let fingerprint = input.fingerprint();
        if let Some(decision) = self.lookup(&fingerprint) {
            trace!(principal = %input.principal_id, "decision cache hit");
            return Ok(decision);
        }
        let decision = self.inner.evaluate(input).await?;
        self.store(fingerprint, &decision);
        Ok(decision)
    }

    async fn install_policy(&self, record: &PolicyRecord) -> PolicyResult<()> {
        self.inner.install_policy(record).await?;
        self.invalidate();
        Ok(())
    }

    async fn remove_policy(&self, policy_id: &PolicyId) -> PolicyResult<()> {
        self.inner.remove_policy(policy_id).await?;
        self.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleBasedEvaluator;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEvaluator {
        calls: AtomicUsize,
        inner: RuleBasedEvaluator,
    }

    #[async_trait]
    impl PolicyEvaluator for CountingEvaluator {
        async fn evaluate(&self, input: &DecisionInput) -> PolicyResult<PolicyDecision> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.evaluate(input).await
        }

        async fn install_policy(&self, record: &PolicyRecord) -> PolicyResult<()> {
            self.inner.install_policy(record).await
        }

        async fn remove_policy(&self, policy_id: &PolicyId) -> PolicyResult<()> {
            self.inner.remove_policy(policy_id).await
        }
    }

    fn allow_everything() -> PolicyRecord {
        PolicyRecord::new(
            PolicyId::new("allow-all").unwrap(),
            json!({"rules": [{"effect": "allow"}]}).to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn repeated_inputs_hit_the_cache() {
        let counting = Arc::new(CountingEvaluator {
            calls: AtomicUsize::new(0),
            inner: RuleBasedEvaluator::new(),
        });
        let cached = CachingEvaluator::new(counting.clone(), Duration::from_secs(60));
        cached.install_policy(&allow_everything()).await.unwrap();

        let input = DecisionInput::kb_query("a", "kb", "sql_query");
        assert!(cached.evaluate(&input).await.unwrap().is_allow());
        assert!(cached.evaluate(&input).await.unwrap().is_allow());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn policy_change_invalidates_cached_decisions() {
        let counting = Arc::new(CountingEvaluator {
            calls: AtomicUsize::new(0),
            inner: RuleBasedEvaluator::new(),
        });
        let cached = CachingEvaluator::new(counting.clone(), Duration::from_secs(60));
        cached.install_policy(&allow_everything()).await.unwrap();

        let input = DecisionInput::kb_query("a", "kb", "sql_query");
        assert!(cached.evaluate(&input).await.unwrap().is_allow());

        cached
            .remove_policy(&PolicyId::new("allow-all").unwrap())
            .await
            .unwrap();
        assert!(!cached.evaluate(&input).await.unwrap().is_allow());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }
}
