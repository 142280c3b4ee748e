//! Static operation registry built at worker startup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mesh_primitives::{KbType, kb_operations};
use serde_json::Value;

use crate::backend::KbBackend;
use crate::{AdapterError, AdapterResult};

/// Trait implemented by per-operation handlers.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Executes the operation with the given parameters.
    async fn invoke(&self, params: Value) -> AdapterResult<Value>;
}

#[async_trait]
impl<F, Fut> OperationHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = AdapterResult<Value>> + Send,
{
    async fn invoke(&self, params: Value) -> AdapterResult<Value> {
        (self)(params).await
    }
}

/// Maps operation names onto handlers for one backend type.
///
/// The registry is assembled once at startup; names outside the backend
/// vocabulary and duplicates are rejected there, so dispatch never meets
/// an operation the registry did not enumerate.
pub struct OperationRegistry {
    kb_type: KbType,
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    /// Creates an empty registry for the given backend type.
    #[must_use]
    pub fn new(kb_type: KbType) -> Self {
        Self {
            kb_type,
            handlers: HashMap::new(),
        }
    }

    /// Builds a registry that forwards every operation the backend serves
    /// to [`KbBackend::execute`].
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::ForeignOperation`] when the backend
    /// advertises an operation outside its type vocabulary.
    pub fn for_backend(backend: Arc<dyn KbBackend>) -> AdapterResult<Self> {
        let mut registry = Self::new(backend.kb_type());
        for operation in backend.operations() {
            let backend = Arc::clone(&backend);
            let name = operation.clone();
            registry.register(&operation, move |params: Value| {
                let backend = Arc::clone(&backend);
                let name = name.clone();
                async move { backend.execute(&name, &params).await }
            })?;
        }
        Ok(registry)
    }

    /// Returns the backend type the registry serves.
    #[must_use]
    pub const fn kb_type(&self) -> KbType {
        self.kb_type
    }

    /// Returns the registered operation names.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registers a handler under an operation name.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::ForeignOperation`] for names outside the
    /// backend vocabulary and [`AdapterError::DuplicateOperation`] for
    /// names already taken.
    pub fn register<H>(&mut self, operation: &str, handler: H) -> AdapterResult<()>
    where
        H: OperationHandler + 'static,
    {
        if !kb_operations(self.kb_type).contains(&operation) {
            return Err(AdapterError::ForeignOperation {
                operation: operation.to_owned(),
                kb_type: self.kb_type.to_string(),
            });
        }
        if self.handlers.contains_key(operation) {
            return Err(AdapterError::DuplicateOperation {
                operation: operation.to_owned(),
            });
        }
        self.handlers.insert(operation.to_owned(), Arc::new(handler));
        Ok(())
    }

    /// Dispatches an operation to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UnknownOperation`] (echoing the registered
    /// set) for unregistered names, and propagates handler failures.
    pub async fn dispatch(&self, operation: &str, params: Value) -> AdapterResult<Value> {
        let Some(handler) = self.handlers.get(operation) else {
            return Err(AdapterError::UnknownOperation {
                operation: operation.to_owned(),
                allowed: self.operations(),
            });
        };
        handler.invoke(params).await
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("kb_type", &self.kb_type)
            .field("operations", &self.operations())
            .finish()
    }
}
