//! Adapter worker loop.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use mesh_primitives::KbId;
use mesh_transport::{Delivery, Transport, subject};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::protocol::{AdapterReply, AdapterRequest};
use crate::registry::OperationRegistry;
use crate::{AdapterError, AdapterResult};

/// Serves one knowledge base on `{kb_id}.adapter.query`.
///
/// Every inbound request runs as its own task under a hard execution
/// timeout, so a wedged driver call can never block the subject or hold
/// the transport's reply window open indefinitely.
pub struct AdapterWorker {
    kb_id: KbId,
    transport: Arc<dyn Transport>,
    registry: Arc<OperationRegistry>,
    execution_timeout: Duration,
}

impl AdapterWorker {
    /// Creates a worker over the given registry.
    #[must_use]
    pub fn new(
        kb_id: KbId,
        transport: Arc<dyn Transport>,
        registry: OperationRegistry,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            kb_id,
            transport,
            registry: Arc::new(registry),
            execution_timeout,
        }
    }

    /// Returns the knowledge base this worker serves.
    #[must_use]
    pub const fn kb_id(&self) -> &KbId {
        &self.kb_id
    }

    /// Subscribes and serves requests until the transport closes.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the subscription cannot be
    /// established.
    pub async fn run(self) -> AdapterResult<()> {
        let subject = subject::adapter_query(&self.kb_id);
        let mut inbound = self.transport.subscribe(&subject).await?;
        info!(kb_id = %self.kb_id, %subject, "adapter worker listening");

        while let Some(delivery) = inbound.next().await {
            let transport = Arc::clone(&self.transport);
            let registry = Arc::clone(&self.registry);
            let execution_timeout = self.execution_timeout;
            let kb_id = self.kb_id.clone();
            tokio::spawn(async move {
                let reply = handle(&registry, &delivery, execution_timeout).await;
                let payload = match serde_json::to_vec(&reply) {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(err) => {
                        warn!(kb_id = %kb_id, ?err, "failed to encode adapter reply");
                        return;
                    }
                };
                if let Err(err) = transport.respond(&delivery, payload).await {
                    warn!(kb_id = %kb_id, ?err, "failed to send adapter reply");
                }
            });
        }
        info!(kb_id = %self.kb_id, "adapter worker stopped");
        Ok(())
    }

    /// Spawns [`run`](Self::run) onto the runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<AdapterResult<()>> {
        tokio::spawn(self.run())
    }
}

impl std::fmt::Debug for AdapterWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterWorker")
            .field("kb_id", &self.kb_id)
            .field("execution_timeout", &self.execution_timeout)
            .finish_non_exhaustive()
    }
}

async fn handle(
    registry: &OperationRegistry,
    delivery: &Delivery,
    execution_timeout: Duration,
) -> AdapterReply {
    let request: AdapterRequest = match serde_json::from_slice(&delivery.payload) {
        Ok(request) => request,
        Err(err) => return AdapterReply::error(format!("malformed adapter request: {err}")),
    };
    debug!(operation = %request.operation, "adapter request");

    let outcome = timeout(
        execution_timeout,
        registry.dispatch(&request.operation, request.params),
    )
    .await
    .unwrap_or_else(|_| {
        Err(AdapterError::Timeout {
            operation: request.operation.clone(),
            timeout: execution_timeout,
        })
    });

    match outcome {
        Ok(data) => AdapterReply::success(data),
        Err(err) => AdapterReply::error(err.to_string()),
    }
}
