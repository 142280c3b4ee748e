//! Backend trait implemented by concrete drivers.

use async_trait::async_trait;
use mesh_primitives::KbType;
use serde_json::Value;

use crate::AdapterResult;

/// A knowledge-base driver.
///
/// Implementations own their connection pool and must return (success or
/// structured error) within the worker's execution timeout; read
/// operations must be idempotent because the transport is at-most-once
/// and callers may retry.
#[async_trait]
pub trait KbBackend: Send + Sync {
    /// Returns the backend type, which fixes the operation vocabulary.
    fn kb_type(&self) -> KbType;

    /// Returns the operations this backend actually serves, a subset of
    /// the type vocabulary.
    fn operations(&self) -> Vec<String>;

    /// Executes one native operation.
    async fn execute(&self, operation: &str, params: &Value) -> AdapterResult<Value>;
}
