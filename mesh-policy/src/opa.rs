//! OPA-backed policy evaluator speaking the REST data and policy APIs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Method, Request, Uri};
use mesh_primitives::{PolicyId, PolicyRecord};
use serde::Deserialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::debug;

use crate::decision::{DecisionInput, PolicyDecision};
use crate::evaluator::{PolicyError, PolicyEvaluator, PolicyResult};
use crate::http_client::{HyperClient, build_https_client};

/// Configuration for [`OpaClient`].
#[derive(Clone, Debug)]
pub struct OpaConfig {
    base_url: String,
    decision_path: String,
    timeout: Duration,
}

impl OpaConfig {
    /// Creates a configuration pointing at the given OPA base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            decision_path: "mesh/decision".to_owned(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Overrides the `<package>/<rule>` path queried for decisions.
    #[must_use]
    pub fn with_decision_path(mut self, path: impl Into<String>) -> Self {
        self.decision_path = path.into();
        self
    }

    /// Sets the per-call HTTP timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Thin client for an external OPA evaluator.
///
/// Decisions come from `POST /v1/data/<package>/<rule>`; documents are
/// managed through `PUT`/`DELETE /v1/policies/<id>`. Any transport failure
/// surfaces as [`PolicyError::EvaluatorUnavailable`] so callers fail closed.
pub struct OpaClient {
    client: HyperClient,
    config: OpaConfig,
}

impl fmt::Debug for OpaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaClient")
            .field("base_url", &self.config.base_url)
            .field("decision_path", &self.config.decision_path)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Deserialize)]
struct OpaDecisionDoc {
    #[serde(default)]
    allow: bool,
    #[serde(default)]
    masking_rules: Vec<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    policy_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpaDataReply {
    #[serde(default)]
    result: Option<OpaDecisionDoc>,
}

impl OpaClient {
    /// Constructs a client from the supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::EvaluatorUnavailable`] when the base URL does
    /// not parse.
    pub fn new(config: OpaConfig) -> PolicyResult<Self> {
        format!("{}v1/data/{}", config.base_url, config.decision_path)
            .parse::<Uri>()
            .map_err(|err| PolicyError::unavailable(format!("invalid OPA base url: {err}")))?;
        Ok(Self {
            client: build_https_client(),
            config,
        })
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Body>,
        content_type: &'static str,
    ) -> PolicyResult<hyper::body::Bytes> {
        let uri = format!("{}{path}", self.config.base_url)
            .parse::<Uri>()
            .map_err(|err| PolicyError::unavailable(format!("invalid OPA uri: {err}")))?;

        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        let request = builder
            .body(body.unwrap_or_else(Body::empty))
            .map_err(|err| PolicyError::unavailable(format!("failed to build OPA request: {err}")))?;

        let response = timeout(self.config.timeout, self.client.request(request))
            .await
            .map_err(|_| PolicyError::unavailable("OPA request timed out"))?
            .map_err(|err| PolicyError::unavailable(format!("OPA request failed: {err}")))?;

        let status = response.status();
        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| PolicyError::unavailable(format!("failed to read OPA response: {err}")))?;

        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes).to_string();
            return Err(PolicyError::unavailable(format!(
                "OPA returned {status}: {reason}"
            )));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl PolicyEvaluator for OpaClient {
    async fn evaluate(&self, input: &DecisionInput) -> PolicyResult<PolicyDecision> {
        let payload = serde_json::to_vec(&json!({ "input": input }))?;
        let path = format!("v1/data/{}", self.config.decision_path);
        let bytes = self
            .call(Method::POST, &path, Some(Body::from(payload)), "application/json")
            .await?;

        let reply: OpaDataReply = serde_json::from_slice(&bytes)
            .map_err(|err| PolicyError::unavailable(format!("malformed OPA decision: {err}")))?;

        // An absent result document means no policy spoke to the input.
        let doc = reply.result.unwrap_or_default();
        debug!(allow = doc.allow, rules = doc.masking_rules.len(), "opa decision");

        let mut decision = if doc.allow {
            PolicyDecision::allow().with_masking_rules(doc.masking_rules)
        } else {
            PolicyDecision::deny(
                doc.reason
                    .clone()
                    .unwrap_or_else(|| "denied by policy".to_owned()),
            )
        };
        if let Some(reason) = doc.reason {
            decision = decision.with_reason(reason);
        }
        if let Some(version) = doc.policy_version {
            decision = decision.with_policy_version(version);
        }
        Ok(decision)
    }

    async fn install_policy(&self, record: &PolicyRecord) -> PolicyResult<()> {
        let path = format!("v1/policies/{}", record.policy_id());
        self.call(
            Method::PUT,
            &path,
            Some(Body::from(record.body().to_owned())),
            "text/plain",
        )
        .await?;
        Ok(())
    }

    async fn remove_policy(&self, policy_id: &PolicyId) -> PolicyResult<()> {
        let path = format!("v1/policies/{policy_id}");
        self.call(Method::DELETE, &path, None, "text/plain").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_normalizes_base_url() {
        let client = OpaClient::new(OpaConfig::new("http://localhost:8181")).unwrap();
        assert!(client.config.base_url.ends_with('/'));
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let err = OpaClient::new(OpaConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, PolicyError::EvaluatorUnavailable { .. }));
    }

    #[test]
    fn absent_result_defaults_to_deny() {
        let reply: OpaDataReply = serde_json::from_str("{}").unwrap();
        let doc = reply.result.unwrap_or_default();
        assert!(!doc.allow);
    }
}
