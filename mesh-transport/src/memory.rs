//! In-process broker with NATS-compatible semantics.
//!
//! Used by the test suites and by single-process deployments that embed the
//! whole mesh. Fan-out is bounded per subscriber; a subscriber that cannot
//! keep up loses messages rather than stalling publishers (at-most-once).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{RwLock, mpsc};
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::subject;
use crate::traits::{Delivery, DeliveryStream, Transport, TransportError, TransportResult};

const SUBSCRIPTION_BUFFER: usize = 256;

struct SubEntry {
    pattern: String,
    sender: mpsc::Sender<Delivery>,
}

/// Shared in-process broker.
///
/// Clones share the same subject space.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    subscriptions: Arc<RwLock<Vec<SubEntry>>>,
}

impl InMemoryTransport {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn fan_out(&self, subject: &str, payload: &Bytes, reply: Option<&str>) -> usize {
        let mut delivered = 0;
        let mut saw_closed = false;
        {
            let guard = self.subscriptions.read().await;
            for entry in guard.iter() {
                if !subject::matches(&entry.pattern, subject) {
                    continue;
                }
                let delivery = Delivery {
                    subject: subject.to_owned(),
                    payload: payload.clone(),
                    reply: reply.map(ToOwned::to_owned),
                };
                match entry.sender.try_send(delivery) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(subject, pattern = %entry.pattern, "subscriber lagging; message dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => saw_closed = true,
                }
            }
        }
        if saw_closed {
            let mut guard = self.subscriptions.write().await;
            guard.retain(|entry| !entry.sender.is_closed());
        }
        delivered
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, subject: &str, payload: Bytes) -> TransportResult<()> {
        self.fan_out(subject, &payload, None).await;
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        deadline: Duration,
    ) -> TransportResult<Bytes> {
        let inbox = format!("_INBOX.{}", Uuid::new_v4().simple());
        let mut replies = self.subscribe(&inbox).await?;

        let delivered = self.fan_out(subject, &payload, Some(&inbox)).await;
        if delivered == 0 {
            return Err(TransportError::NoResponders {
                subject: subject.to_owned(),
            });
        }

        match timeout(deadline, replies.next()).await {
            Ok(Some(delivery)) => Ok(delivery.payload),
            Ok(None) | Err(_) => Err(TransportError::Timeout {
                subject: subject.to_owned(),
                timeout: deadline,
            }),
        }
    }

    async fn subscribe(&self, pattern: &str) -> TransportResult<DeliveryStream> {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        {
            let mut guard = self.subscriptions.write().await;
            guard.push(SubEntry {
                pattern: pattern.to_owned(),
                sender,
            });
        }
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|delivery| (delivery, receiver))
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_wildcard_subscribers() {
        let transport = InMemoryTransport::new();
        let mut updates = transport.subscribe("mesh.directory.>").await.unwrap();

        transport
            .publish("mesh.directory.updates", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        let delivery = updates.next().await.unwrap();
        assert_eq!(delivery.subject, "mesh.directory.updates");
        assert!(delivery.reply.is_none());
    }

    #[tokio::test]
    async fn request_reply_round_trip() {
        let transport = InMemoryTransport::new();
        let responder = transport.clone();
        let mut inbound = transport.subscribe("sales-kb-1.adapter.query").await.unwrap();

        tokio::spawn(async move {
            let delivery = inbound.next().await.unwrap();
            responder
                .respond(&delivery, Bytes::from_static(b"pong"))
                .await
                .unwrap();
        });

        let reply = transport
            .request(
                "sales-kb-1.adapter.query",
                Bytes::from_static(b"ping"),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(reply, Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn request_without_responders_fails_fast() {
        let transport = InMemoryTransport::new();
        let err = transport
            .request("mesh.health", Bytes::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoResponders { .. }));
    }

    #[tokio::test]
    async fn request_times_out_when_responder_stays_silent() {
        let transport = InMemoryTransport::new();
        let _silent = transport.subscribe("mesh.health").await.unwrap();

        let err = transport
            .request("mesh.health", Bytes::new(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn respond_requires_reply_inbox() {
        let transport = InMemoryTransport::new();
        let delivery = Delivery {
            subject: "mesh.health".into(),
            payload: Bytes::new(),
            reply: None,
        };
        let err = transport
            .respond(&delivery, Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoReplyInbox { .. }));
    }
}
