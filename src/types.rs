//! Common types used throughout the lobby bot

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a channel or conversation on the messaging platform
pub type LocationId = String;

/// Identifier of a platform user
pub type UserId = String;

/// Identifier of a posted message (the join point of a lobby)
pub type MessageHandle = String;

/// Unique identifier for lobbies
pub type LobbyId = Uuid;

/// Reference to a platform interaction that can be responded to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRef {
    pub id: String,
    pub token: String,
}

/// A slash command was invoked by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvoked {
    pub interaction: InteractionRef,
    pub command_name: String,
    pub location: LocationId,
    pub user_id: UserId,
}

/// A user clicked a control attached to a posted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInteracted {
    pub interaction: InteractionRef,
    pub component_id: String,
    pub location: LocationId,
    pub user_id: UserId,
    pub message_id: MessageHandle,
}

/// Union type for all inbound platform events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlatformEvent {
    CommandInvoked(CommandInvoked),
    ComponentInteracted(ComponentInteracted),
}

impl PlatformEvent {
    /// Interaction that produced this event
    pub fn interaction(&self) -> &InteractionRef {
        match self {
            PlatformEvent::CommandInvoked(event) => &event.interaction,
            PlatformEvent::ComponentInteracted(event) => &event.interaction,
        }
    }

    /// Location the event happened in
    pub fn location(&self) -> &str {
        match self {
            PlatformEvent::CommandInvoked(event) => &event.location,
            PlatformEvent::ComponentInteracted(event) => &event.location,
        }
    }

    /// User that triggered the event
    pub fn user_id(&self) -> &str {
        match self {
            PlatformEvent::CommandInvoked(event) => &event.user_id,
            PlatformEvent::ComponentInteracted(event) => &event.user_id,
        }
    }

    /// Routing identifier: the command name or the component id
    pub fn route_key(&self) -> &str {
        match self {
            PlatformEvent::CommandInvoked(event) => &event.command_name,
            PlatformEvent::ComponentInteracted(event) => &event.component_id,
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PlatformEvent::CommandInvoked(_) => "command",
            PlatformEvent::ComponentInteracted(_) => "component",
        }
    }
}

/// Visual style of a button control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    Primary,
    Secondary,
}

/// Actionable control attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
}

/// Message sent in response to an interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    /// Only visible to the user who triggered the interaction
    #[serde(default)]
    pub ephemeral: bool,
}

impl OutboundMessage {
    /// Plain public message without controls
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            components: Vec::new(),
            ephemeral: false,
        }
    }

    /// Message visible only to the invoking user
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            components: Vec::new(),
            ephemeral: true,
        }
    }

    /// Attach controls to the message
    pub fn with_components(mut self, components: Vec<Component>) -> Self {
        self.components = components;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_event_wire_format() {
        let json = r#"{
            "type": "ComponentInteracted",
            "interaction": {"id": "i-1", "token": "tok"},
            "component_id": "secret-hitler-join",
            "location": "chan1",
            "user_id": "alice",
            "message_id": "m-1"
        }"#;

        let event: PlatformEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind(), "component");
        assert_eq!(event.location(), "chan1");
        assert_eq!(event.user_id(), "alice");
        assert_eq!(event.route_key(), "secret-hitler-join");
        assert_eq!(event.interaction().id, "i-1");
    }

    #[test]
    fn test_outbound_message_builders() {
        let message = OutboundMessage::ephemeral("nope");
        assert!(message.ephemeral);
        assert!(message.components.is_empty());

        let json = serde_json::to_value(OutboundMessage::text("hi")).unwrap();
        assert!(json.get("components").is_none());
        assert_eq!(json["ephemeral"], false);
    }
}
