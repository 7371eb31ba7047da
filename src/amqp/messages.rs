//! AMQP message definitions and serialization

use crate::error::{LobbyBotError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Default AMQP queue and exchange names
pub const INTERACTIONS_QUEUE: &str = "lobby_bot.interactions";
pub const PLATFORM_EXCHANGE: &str = "lobby_bot.platform";

/// Routing keys for outbound platform requests
pub const RESPOND_ROUTING_KEY: &str = "platform.respond";
pub const EDIT_ROUTING_KEY: &str = "platform.edit";

/// Message envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: crate::utils::generate_correlation_id(),
            timestamp: crate::utils::current_timestamp(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            LobbyBotError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }
}

/// Request sent to the platform gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlatformRequest {
    /// Respond to an interaction with a new message
    Respond {
        interaction: InteractionRef,
        message: OutboundMessage,
    },
    /// Replace the content of a posted message
    Edit {
        location: LocationId,
        message_id: MessageHandle,
        content: String,
    },
}

impl PlatformRequest {
    /// Operation name used in errors and metrics
    pub fn operation(&self) -> &'static str {
        match self {
            PlatformRequest::Respond { .. } => "respond",
            PlatformRequest::Edit { .. } => "edit",
        }
    }

    pub fn routing_key(&self) -> &'static str {
        match self {
            PlatformRequest::Respond { .. } => RESPOND_ROUTING_KEY,
            PlatformRequest::Edit { .. } => EDIT_ROUTING_KEY,
        }
    }
}

/// Gateway answer to a `PlatformRequest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PlatformReply {
    Sent { message_handle: MessageHandle },
    Edited,
    Failed { reason: String },
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Deserialize an inbound platform event from bytes.
    ///
    /// Accepts either a bare event or one wrapped in a `MessageEnvelope`.
    pub fn deserialize_event(bytes: &[u8]) -> Result<PlatformEvent> {
        let event = match serde_json::from_slice::<MessageEnvelope<PlatformEvent>>(bytes) {
            Ok(envelope) => envelope.payload,
            Err(_) => serde_json::from_slice::<PlatformEvent>(bytes).map_err(|e| {
                LobbyBotError::InvalidEvent {
                    reason: format!("Failed to deserialize platform event: {}", e),
                }
            })?,
        };

        Self::validate_event(&event)?;
        Ok(event)
    }

    /// Validate a platform event
    pub fn validate_event(event: &PlatformEvent) -> Result<()> {
        if event.interaction().id.is_empty() {
            return Err(LobbyBotError::InvalidEvent {
                reason: "Interaction ID cannot be empty".to_string(),
            }
            .into());
        }

        if event.location().is_empty() {
            return Err(LobbyBotError::InvalidEvent {
                reason: "Location cannot be empty".to_string(),
            }
            .into());
        }

        if event.user_id().is_empty() {
            return Err(LobbyBotError::InvalidEvent {
                reason: "User ID cannot be empty".to_string(),
            }
            .into());
        }

        if let PlatformEvent::ComponentInteracted(component) = event {
            if component.message_id.is_empty() {
                return Err(LobbyBotError::InvalidEvent {
                    reason: "Component interactions must carry a message ID".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Deserialize a gateway reply from bytes
    pub fn deserialize_reply(bytes: &[u8]) -> Result<PlatformReply> {
        serde_json::from_slice(bytes).map_err(|e| {
            LobbyBotError::InvalidEvent {
                reason: format!("Failed to deserialize platform reply: {}", e),
            }
            .into()
        })
    }

    /// Serialize any AMQP message to bytes
    pub fn serialize_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| {
            LobbyBotError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_command() -> PlatformEvent {
        PlatformEvent::CommandInvoked(CommandInvoked {
            interaction: InteractionRef {
                id: "i-1".to_string(),
                token: "tok".to_string(),
            },
            command_name: "new-game".to_string(),
            location: "chan1".to_string(),
            user_id: "alice".to_string(),
        })
    }

    #[test]
    fn test_message_envelope_creation() {
        let envelope = MessageEnvelope::new(create_test_command(), "interaction".to_string());

        assert_eq!(envelope.routing_key, "interaction");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_deserialize_bare_and_enveloped_events() {
        let event = create_test_command();

        let bare = MessageUtils::serialize_message(&event).unwrap();
        assert_eq!(MessageUtils::deserialize_event(&bare).unwrap(), event);

        let wrapped = MessageEnvelope::new(event.clone(), "interaction".to_string())
            .to_bytes()
            .unwrap();
        assert_eq!(MessageUtils::deserialize_event(&wrapped).unwrap(), event);
    }

    #[test]
    fn test_malformed_event_is_rejected() {
        assert!(MessageUtils::deserialize_event(b"not json").is_err());
        assert!(MessageUtils::deserialize_event(br#"{"type": "Unknown"}"#).is_err());
    }

    #[test]
    fn test_event_validation() {
        assert!(MessageUtils::validate_event(&create_test_command()).is_ok());

        let mut event = create_test_command();
        if let PlatformEvent::CommandInvoked(command) = &mut event {
            command.location.clear();
        }
        assert!(MessageUtils::validate_event(&event).is_err());

        let component = PlatformEvent::ComponentInteracted(ComponentInteracted {
            interaction: InteractionRef {
                id: "i-2".to_string(),
                token: "tok".to_string(),
            },
            component_id: "secret-hitler-join".to_string(),
            location: "chan1".to_string(),
            user_id: "bob".to_string(),
            message_id: String::new(),
        });
        assert!(MessageUtils::validate_event(&component).is_err());
    }

    #[test]
    fn test_platform_request_routing() {
        let edit = PlatformRequest::Edit {
            location: "chan1".to_string(),
            message_id: "m-1".to_string(),
            content: "hello".to_string(),
        };
        assert_eq!(edit.routing_key(), EDIT_ROUTING_KEY);
        assert_eq!(edit.operation(), "edit");

        let json = serde_json::to_value(&edit).unwrap();
        assert_eq!(json["type"], "Edit");
        assert_eq!(json["message_id"], "m-1");
    }

    #[test]
    fn test_reply_wire_format() {
        let reply = MessageUtils::deserialize_reply(br#"{"status": "sent", "message_handle": "m-7"}"#)
            .unwrap();
        assert_eq!(
            reply,
            PlatformReply::Sent {
                message_handle: "m-7".to_string()
            }
        );

        let reply = MessageUtils::deserialize_reply(br#"{"status": "failed", "reason": "gone"}"#)
            .unwrap();
        assert!(matches!(reply, PlatformReply::Failed { .. }));
    }
}
