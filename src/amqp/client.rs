//! Platform client speaking request/reply over AMQP
//!
//! Requests are published to the platform exchange with a `reply_to` queue
//! private to this process and a fresh correlation id. The gateway answers
//! with a `PlatformReply` carrying the same correlation id, which completes
//! the waiting call. Calls without an answer fail after the reply timeout.

use crate::amqp::messages::{MessageEnvelope, MessageUtils, PlatformReply, PlatformRequest};
use crate::error::{LobbyBotError, Result};
use crate::platform::PlatformClient;
use crate::types::{InteractionRef, MessageHandle, OutboundMessage};
use amqprs::{
    channel::{
        BasicConsumeArguments, BasicPublishArguments, Channel, ExchangeDeclareArguments,
        QueueDeclareArguments,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Calls waiting for a gateway reply, keyed by correlation id
#[derive(Debug, Default)]
pub struct PendingReplies {
    waiting: Mutex<HashMap<String, oneshot::Sender<PlatformReply>>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for the reply to `correlation_id`
    pub fn register(&self, correlation_id: &str) -> Result<oneshot::Receiver<PlatformReply>> {
        let (tx, rx) = oneshot::channel();
        let mut waiting = self
            .waiting
            .lock()
            .map_err(|_| LobbyBotError::lock_poisoned("pending replies"))?;
        waiting.insert(correlation_id.to_string(), tx);
        Ok(rx)
    }

    /// Deliver a reply. Returns false if nobody was waiting for it.
    pub fn complete(&self, correlation_id: &str, reply: PlatformReply) -> bool {
        let sender = match self.waiting.lock() {
            Ok(mut waiting) => waiting.remove(correlation_id),
            Err(_) => None,
        };

        match sender {
            Some(sender) => sender.send(reply).is_ok(),
            None => false,
        }
    }

    /// Stop waiting for a reply
    pub fn cancel(&self, correlation_id: &str) {
        if let Ok(mut waiting) = self.waiting.lock() {
            waiting.remove(correlation_id);
        }
    }

    /// Wait up to `reply_timeout` for the reply registered under
    /// `correlation_id`. On timeout the waiter is removed, so a late reply
    /// is dropped.
    pub async fn wait(
        &self,
        operation: &str,
        correlation_id: &str,
        reply: oneshot::Receiver<PlatformReply>,
        reply_timeout: Duration,
    ) -> Result<PlatformReply> {
        match timeout(reply_timeout, reply).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(LobbyBotError::PlatformRequestFailed {
                operation: operation.to_string(),
                message: "Reply channel closed".to_string(),
            }
            .into()),
            Err(_) => {
                self.cancel(correlation_id);
                warn!(
                    "Platform request timed out - operation: {}, correlation_id: {}",
                    operation, correlation_id
                );
                Err(LobbyBotError::PlatformTimeout {
                    operation: operation.to_string(),
                    timeout_ms: u64::try_from(reply_timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .into())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.waiting
            .lock()
            .map(|waiting| waiting.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// AMQP-based platform client implementation
pub struct AmqpPlatformClient {
    channel: Channel,
    exchange: String,
    reply_queue: String,
    pending: Arc<PendingReplies>,
    reply_timeout: Duration,
}

impl AmqpPlatformClient {
    /// Create a new platform client and start listening for replies
    pub async fn new(channel: Channel, exchange: &str, reply_timeout: Duration) -> Result<Self> {
        let client = Self {
            channel,
            exchange: exchange.to_string(),
            reply_queue: format!("lobby_bot.replies.{}", uuid::Uuid::new_v4()),
            pending: Arc::new(PendingReplies::new()),
            reply_timeout,
        };

        client.setup().await?;

        Ok(client)
    }

    /// Declare the exchange and the private reply queue
    async fn setup(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.exchange, "topic")
            .durable(true)
            .finish();
        self.channel.exchange_declare(args).await.map_err(|e| {
            LobbyBotError::AmqpConnectionFailed {
                message: format!("Failed to declare platform exchange: {}", e),
            }
        })?;

        let args = QueueDeclareArguments::new(&self.reply_queue)
            .exclusive(true)
            .auto_delete(true)
            .finish();
        self.channel.queue_declare(args).await.map_err(|e| {
            LobbyBotError::AmqpConnectionFailed {
                message: format!("Failed to declare reply queue: {}", e),
            }
        })?;

        let consumer_tag = format!("{}-consumer", self.reply_queue);
        let args = BasicConsumeArguments::new(&self.reply_queue, &consumer_tag)
            .manual_ack(false)
            .finish();
        self.channel
            .basic_consume(ReplyConsumer::new(self.pending.clone()), args)
            .await
            .map_err(|e| LobbyBotError::AmqpConnectionFailed {
                message: format!("Failed to consume reply queue: {}", e),
            })?;

        info!(
            "Platform client ready - exchange: '{}', reply_queue: '{}'",
            self.exchange, self.reply_queue
        );
        Ok(())
    }

    /// Publish a request and wait for its reply
    async fn call(&self, request: PlatformRequest) -> Result<PlatformReply> {
        let operation = request.operation();
        let routing_key = request.routing_key();
        let envelope = MessageEnvelope::new(request, routing_key.to_string());
        let correlation_id = envelope.correlation_id.clone();
        let payload = envelope.to_bytes()?;

        let reply = self.pending.register(&correlation_id)?;

        let args = BasicPublishArguments::new(&self.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_correlation_id(&correlation_id)
            .with_reply_to(&self.reply_queue)
            .with_content_type("application/json");

        if let Err(e) = self.channel.basic_publish(properties, payload, args).await {
            self.pending.cancel(&correlation_id);
            return Err(LobbyBotError::PlatformRequestFailed {
                operation: operation.to_string(),
                message: format!("Failed to publish request: {}", e),
            }
            .into());
        }

        debug!(
            "Platform request published - operation: {}, correlation_id: {}",
            operation, correlation_id
        );

        self.pending
            .wait(operation, &correlation_id, reply, self.reply_timeout)
            .await
    }
}

fn unexpected_reply(operation: &str, reply: PlatformReply) -> anyhow::Error {
    match reply {
        PlatformReply::Failed { reason } => LobbyBotError::PlatformRequestFailed {
            operation: operation.to_string(),
            message: reason,
        }
        .into(),
        other => LobbyBotError::PlatformRequestFailed {
            operation: operation.to_string(),
            message: format!("Unexpected reply: {:?}", other),
        }
        .into(),
    }
}

#[async_trait]
impl PlatformClient for AmqpPlatformClient {
    async fn respond_with_message(
        &self,
        interaction: &InteractionRef,
        message: OutboundMessage,
    ) -> Result<MessageHandle> {
        let request = PlatformRequest::Respond {
            interaction: interaction.clone(),
            message,
        };

        match self.call(request).await? {
            PlatformReply::Sent { message_handle } => Ok(message_handle),
            other => Err(unexpected_reply("respond", other)),
        }
    }

    async fn edit_message(&self, location: &str, handle: &str, content: &str) -> Result<()> {
        let request = PlatformRequest::Edit {
            location: location.to_string(),
            message_id: handle.to_string(),
            content: content.to_string(),
        };

        match self.call(request).await? {
            PlatformReply::Edited => Ok(()),
            other => Err(unexpected_reply("edit", other)),
        }
    }
}

/// Consumer completing pending calls from the reply queue
struct ReplyConsumer {
    pending: Arc<PendingReplies>,
}

impl ReplyConsumer {
    fn new(pending: Arc<PendingReplies>) -> Self {
        Self { pending }
    }
}

#[async_trait]
impl AsyncConsumer for ReplyConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        _deliver: Deliver,
        basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let Some(correlation_id) = basic_properties.correlation_id() else {
            warn!("Platform reply without correlation id dropped");
            return;
        };

        let reply = match MessageUtils::deserialize_reply(&content) {
            Ok(reply) => reply,
            Err(e) => PlatformReply::Failed {
                reason: e.to_string(),
            },
        };

        if !self.pending.complete(correlation_id, reply) {
            debug!(
                "Platform reply for unknown or expired request - correlation_id: {}",
                correlation_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_completes_matching_call() {
        let pending = PendingReplies::new();
        let first = pending.register("c-1").unwrap();
        let second = pending.register("c-2").unwrap();
        assert_eq!(pending.len(), 2);

        assert!(pending.complete("c-2", PlatformReply::Edited));
        assert!(pending.complete(
            "c-1",
            PlatformReply::Sent {
                message_handle: "m-1".to_string()
            }
        ));

        assert_eq!(
            first.await.unwrap(),
            PlatformReply::Sent {
                message_handle: "m-1".to_string()
            }
        );
        assert_eq!(second.await.unwrap(), PlatformReply::Edited);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_late_reply_is_ignored() {
        let pending = PendingReplies::new();
        let _rx = pending.register("c-1").unwrap();
        pending.cancel("c-1");

        assert!(!pending.complete("c-1", PlatformReply::Edited));
        assert!(!pending.complete("unknown", PlatformReply::Edited));
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let pending = PendingReplies::new();
        let rx = pending.register("c-1").unwrap();

        let err = pending
            .wait("edit", "c-1", rx, Duration::from_millis(10))
            .await
            .unwrap_err();

        match err.downcast_ref::<LobbyBotError>() {
            Some(LobbyBotError::PlatformTimeout {
                operation,
                timeout_ms,
            }) => {
                assert_eq!(operation, "edit");
                assert_eq!(*timeout_ms, 10);
            }
            other => panic!("Expected a timeout, got {:?}", other),
        }

        assert!(pending.is_empty());
        assert!(!pending.complete("c-1", PlatformReply::Edited));
    }

    #[tokio::test]
    async fn test_wait_returns_reply_before_timeout() {
        let pending = Arc::new(PendingReplies::new());
        let rx = pending.register("c-1").unwrap();

        let responder = {
            let pending = pending.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                pending.complete("c-1", PlatformReply::Edited)
            })
        };

        let reply = pending
            .wait("edit", "c-1", rx, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply, PlatformReply::Edited);
        assert!(responder.await.unwrap());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_failed_reply_maps_to_error() {
        let error = unexpected_reply(
            "edit",
            PlatformReply::Failed {
                reason: "unknown message".to_string(),
            },
        );
        assert!(error.to_string().contains("unknown message"));

        let error = unexpected_reply("respond", PlatformReply::Edited);
        assert!(error.to_string().contains("Unexpected reply"));
    }
}
