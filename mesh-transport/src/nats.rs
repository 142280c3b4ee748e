//! NATS-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::info;

use crate::traits::{Delivery, DeliveryStream, Transport, TransportError, TransportResult};

/// Transport bound to a NATS cluster.
#[derive(Clone, Debug)]
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    /// Connects to the NATS server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connection`] when the connection cannot be
    /// established.
    pub async fn connect(url: &str) -> TransportResult<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|err| TransportError::connection(format!("nats connect failed: {err}")))?;
        info!(url, "connected to nats");
        Ok(Self { client })
    }

    /// Wraps an already-connected client.
    #[must_use]
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(&self, subject: &str, payload: Bytes) -> TransportResult<()> {
        self.client
            .publish(subject.to_owned(), payload)
            .await
            .map_err(|err| TransportError::connection(format!("nats publish failed: {err}")))
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        deadline: Duration,
    ) -> TransportResult<Bytes> {
        let request = async_nats::Request::new()
            .payload(payload)
            .timeout(Some(deadline));
        let message = self
            .client
            .send_request(subject.to_owned(), request)
            .await
            .map_err(|err| match err.kind() {
                async_nats::RequestErrorKind::TimedOut => TransportError::Timeout {
                    subject: subject.to_owned(),
                    timeout: deadline,
                },
                async_nats::RequestErrorKind::NoResponders => TransportError::NoResponders {
                    subject: subject.to_owned(),
                },
                async_nats::RequestErrorKind::Other => {
                    TransportError::connection(format!("nats request failed: {err}"))
                }
            })?;
        Ok(message.payload)
    }

    async fn subscribe(&self, pattern: &str) -> TransportResult<DeliveryStream> {
        let subscriber = self
            .client
            .subscribe(pattern.to_owned())
            .await
            .map_err(|err| TransportError::connection(format!("nats subscribe failed: {err}")))?;
        let stream = subscriber.map(|message| Delivery {
            subject: message.subject.to_string(),
            payload: message.payload,
            reply: message.reply.map(|subject| subject.to_string()),
        });
        Ok(Box::pin(stream))
    }
}
