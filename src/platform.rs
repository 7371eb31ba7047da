//! Outbound operations on the messaging platform

use crate::error::{LobbyBotError, Result};
use crate::types::{InteractionRef, MessageHandle, OutboundMessage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Trait for the outbound side of the messaging platform
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Respond to an interaction with a new message and return its handle
    async fn respond_with_message(
        &self,
        interaction: &InteractionRef,
        message: OutboundMessage,
    ) -> Result<MessageHandle>;

    /// Replace the content of a posted message
    async fn edit_message(&self, location: &str, handle: &str, content: &str) -> Result<()>;
}

/// Outbound call recorded by `MockPlatformClient`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Responded {
        interaction_id: String,
        handle: MessageHandle,
        message: OutboundMessage,
    },
    Edited {
        location: String,
        handle: MessageHandle,
        content: String,
    },
}

/// Mock platform client for testing
///
/// Hands out sequential message handles (`msg-1`, `msg-2`, ...), records
/// every call, and can be told to fail or to delay each call.
#[derive(Debug, Default)]
pub struct MockPlatformClient {
    calls: Mutex<Vec<PlatformCall>>,
    next_handle: AtomicU64,
    fail_responses: AtomicBool,
    fail_edits: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockPlatformClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent respond calls fail
    pub fn set_fail_responses(&self, fail: bool) {
        self.fail_responses.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent edit calls fail
    pub fn set_fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    /// Sleep this long inside every call
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut current) = self.delay.lock() {
            *current = delay;
        }
    }

    /// Get all recorded calls (for testing)
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Recorded edits of one message, oldest first
    pub fn edits_of(&self, handle: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Edited {
                    handle: edited,
                    content,
                    ..
                } if edited == handle => Some(content),
                _ => None,
            })
            .collect()
    }

    /// Content currently shown on a message: the last edit, or the
    /// original response if it was never edited
    pub fn current_content(&self, handle: &str) -> Option<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Responded {
                    handle: sent,
                    message,
                    ..
                } if sent == handle => Some(message.content),
                PlatformCall::Edited {
                    handle: edited,
                    content,
                    ..
                } if edited == handle => Some(content),
                _ => None,
            })
            .last()
    }

    /// Ephemeral responses sent so far
    pub fn ephemeral_responses(&self) -> Vec<OutboundMessage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Responded { message, .. } if message.ephemeral => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Clear recorded calls (for testing)
    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    async fn maybe_delay(&self) {
        let delay = self.delay.lock().ok().and_then(|delay| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, call: PlatformCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    async fn respond_with_message(
        &self,
        interaction: &InteractionRef,
        message: OutboundMessage,
    ) -> Result<MessageHandle> {
        self.maybe_delay().await;

        if self.fail_responses.load(Ordering::SeqCst) {
            return Err(LobbyBotError::PlatformRequestFailed {
                operation: "respond".to_string(),
                message: "mock respond failure".to_string(),
            }
            .into());
        }

        let handle = format!("msg-{}", self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.record(PlatformCall::Responded {
            interaction_id: interaction.id.clone(),
            handle: handle.clone(),
            message,
        });
        Ok(handle)
    }

    async fn edit_message(&self, location: &str, handle: &str, content: &str) -> Result<()> {
        self.maybe_delay().await;

        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(LobbyBotError::PlatformRequestFailed {
                operation: "edit".to_string(),
                message: "mock edit failure".to_string(),
            }
            .into());
        }

        self.record(PlatformCall::Edited {
            location: location.to_string(),
            handle: handle.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interaction() -> InteractionRef {
        InteractionRef {
            id: "i-1".to_string(),
            token: "token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_hands_out_sequential_handles() {
        let platform = MockPlatformClient::new();

        let first = platform
            .respond_with_message(&interaction(), OutboundMessage::text("one"))
            .await
            .unwrap();
        let second = platform
            .respond_with_message(&interaction(), OutboundMessage::text("two"))
            .await
            .unwrap();

        assert_eq!(first, "msg-1");
        assert_eq!(second, "msg-2");
        assert_eq!(platform.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_tracks_current_content() {
        let platform = MockPlatformClient::new();
        let handle = platform
            .respond_with_message(&interaction(), OutboundMessage::text("original"))
            .await
            .unwrap();

        assert_eq!(platform.current_content(&handle).unwrap(), "original");

        platform.edit_message("chan1", &handle, "edited").await.unwrap();
        assert_eq!(platform.current_content(&handle).unwrap(), "edited");
        assert_eq!(platform.edits_of(&handle), vec!["edited".to_string()]);
        assert!(platform.current_content("msg-99").is_none());
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let platform = MockPlatformClient::new();
        platform.set_fail_responses(true);
        platform.set_fail_edits(true);

        assert!(platform
            .respond_with_message(&interaction(), OutboundMessage::text("x"))
            .await
            .is_err());
        assert!(platform.edit_message("chan1", "msg-1", "x").await.is_err());
        assert!(platform.calls().is_empty());

        platform.set_fail_edits(false);
        assert!(platform.edit_message("chan1", "msg-1", "x").await.is_ok());
    }
}
