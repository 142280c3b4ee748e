//! Transport trait and shared message types.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Stream of inbound deliveries produced by [`Transport::subscribe`].
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

/// A message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Concrete subject the message was published on.
    pub subject: String,
    /// Raw payload bytes (JSON on every mesh subject).
    pub payload: Bytes,
    /// Reply inbox to answer on, present for request/reply traffic.
    pub reply: Option<String>,
}

/// Errors surfaced by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request deadline elapsed before a reply arrived.
    #[error("request on `{subject}` timed out after {timeout:?}")]
    Timeout {
        /// Subject the request was sent on.
        subject: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// Nothing is subscribed to the request subject.
    #[error("no responders on `{subject}`")]
    NoResponders {
        /// Subject the request was sent on.
        subject: String,
    },
    /// The delivery carried no reply inbox to respond to.
    #[error("delivery on `{subject}` has no reply inbox")]
    NoReplyInbox {
        /// Subject of the offending delivery.
        subject: String,
    },
    /// The transport connection is gone.
    #[error("transport connection error: {reason}")]
    Connection {
        /// Human-readable context for operators.
        reason: String,
    },
}

impl TransportError {
    /// Convenience constructor for connection failures.
    #[must_use]
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }
}

/// Named-subject broker offering pub/sub and request/reply.
///
/// Delivery is at-most-once; subjects are delivered in publish order, with
/// no cross-subject ordering guarantee.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes a message without waiting for consumers.
    async fn publish(&self, subject: &str, payload: Bytes) -> TransportResult<()>;

    /// Sends a request and awaits a single reply within `timeout`.
    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> TransportResult<Bytes>;

    /// Subscribes to a subject pattern (wildcards allowed).
    async fn subscribe(&self, pattern: &str) -> TransportResult<DeliveryStream>;

    /// Answers a request/reply delivery on its reply inbox.
    ///
    /// Returns [`TransportError::NoReplyInbox`] for plain publishes.
    async fn respond(&self, delivery: &Delivery, payload: Bytes) -> TransportResult<()> {
        let Some(reply) = delivery.reply.as_deref() else {
            return Err(TransportError::NoReplyInbox {
                subject: delivery.subject.clone(),
            });
        };
        self.publish(reply, payload).await
    }
}
