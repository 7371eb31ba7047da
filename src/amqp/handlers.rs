//! AMQP consumer for inbound platform events
//!
//! Every delivery on the interactions queue is decoded into a
//! `PlatformEvent` and handed to an `EventHandler` on its own task, so a
//! slow platform call for one interaction never delays the next delivery.

use crate::amqp::messages::MessageUtils;
use crate::error::{LobbyBotError, Result};
use crate::types::PlatformEvent;
use amqprs::{
    channel::{BasicCancelArguments, BasicConsumeArguments, Channel, QueueDeclareArguments},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Trait defining the interface for handling inbound platform events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one decoded platform event
    async fn handle_event(&self, event: PlatformEvent);

    /// Handle a delivery that could not be decoded
    async fn handle_error(&self, error: LobbyBotError, message_data: &[u8]);
}

/// Decode a raw delivery and spawn its handling.
///
/// Returns `None` when the payload was rejected; the handler's
/// `handle_error` has been awaited in that case.
pub async fn route_payload(
    handler: &Arc<dyn EventHandler>,
    content: &[u8],
) -> Option<JoinHandle<()>> {
    match MessageUtils::deserialize_event(content) {
        Ok(event) => {
            debug!(
                "Platform event decoded - kind: {}, location: '{}', user: '{}', route: '{}'",
                event.kind(),
                event.location(),
                event.user_id(),
                event.route_key()
            );
            let handler = handler.clone();
            Some(tokio::spawn(async move {
                handler.handle_event(event).await;
            }))
        }
        Err(e) => {
            debug!("Failed to decode platform event ({} bytes): {}", content.len(), e);
            let error = match e.downcast::<LobbyBotError>() {
                Ok(error) => error,
                Err(other) => LobbyBotError::InvalidEvent {
                    reason: other.to_string(),
                },
            };
            handler.handle_error(error, content).await;
            None
        }
    }
}

/// Consumer for the platform interactions queue
pub struct InteractionConsumer {
    handler: Arc<dyn EventHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl InteractionConsumer {
    /// Create a new interaction consumer
    pub fn new(handler: Arc<dyn EventHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("lobby-bot-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Declare the queue and start consuming messages from it
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = QueueDeclareArguments::new(queue_name).durable(true).finish();
        self.channel
            .queue_declare(args)
            .await
            .map_err(|e| LobbyBotError::AmqpConnectionFailed {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;

        // Interactions expire quickly on the platform, redelivery is useless
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag)
            .manual_ack(false)
            .finish();

        self.channel
            .basic_consume(DeliveryConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| LobbyBotError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming platform events from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            LobbyBotError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming platform events");
        Ok(())
    }
}

/// Internal consumer implementation
struct DeliveryConsumer {
    handler: Arc<dyn EventHandler>,
}

impl DeliveryConsumer {
    fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl AsyncConsumer for DeliveryConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        debug!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            deliver.delivery_tag(),
            deliver.routing_key(),
            content.len()
        );

        route_payload(&self.handler, &content).await;
    }
}

/// Mock event handler for testing
#[derive(Default)]
pub struct MockEventHandler {
    pub received_events: tokio::sync::Mutex<Vec<PlatformEvent>>,
    pub rejected_payloads: tokio::sync::Mutex<Vec<Vec<u8>>>,
}

impl MockEventHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventHandler for MockEventHandler {
    async fn handle_event(&self, event: PlatformEvent) {
        self.received_events.lock().await.push(event);
    }

    async fn handle_error(&self, _error: LobbyBotError, message_data: &[u8]) {
        self.rejected_payloads.lock().await.push(message_data.to_vec());
    }
}
