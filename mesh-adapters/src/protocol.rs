//! Wire contract between the enforcement service and adapter workers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request delivered on `{kb_id}.adapter.query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterRequest {
    /// Operation name from the backend vocabulary.
    pub operation: String,
    /// Operation parameters, forwarded verbatim.
    #[serde(default)]
    pub params: Value,
}

/// Reply returned by an adapter worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterReply {
    /// `success` or `error`.
    pub status: String,
    /// Raw backend payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error description on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AdapterReply {
    /// Builds a success reply carrying the backend payload.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            status: "success".to_owned(),
            data: Some(data),
            error: None,
        }
    }

    /// Builds an error reply.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_owned(),
            data: None,
            error: Some(message.into()),
        }
    }

    /// Returns `true` when the worker reported success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replies_round_trip() {
        let reply = AdapterReply::success(json!({"rows": []}));
        let parsed: AdapterReply =
            serde_json::from_str(&serde_json::to_string(&reply).unwrap()).unwrap();
        assert!(parsed.is_success());
        assert!(parsed.error.is_none());

        let reply = AdapterReply::error("driver unreachable");
        assert!(!reply.is_success());
        assert_eq!(reply.error.as_deref(), Some("driver unreachable"));
    }

    #[test]
    fn request_defaults_params_to_null() {
        let request: AdapterRequest =
            serde_json::from_str(r#"{"operation": "sql_query"}"#).unwrap();
        assert!(request.params.is_null());
    }
}
