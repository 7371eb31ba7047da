//! Error types for the lobby bot
//!
//! Typed errors are defined with thiserror and propagated through the
//! crate as anyhow errors.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific lobby bot scenarios
#[derive(Debug, thiserror::Error)]
pub enum LobbyBotError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Invalid platform event: {reason}")]
    InvalidEvent { reason: String },

    #[error("Platform {operation} request failed: {message}")]
    PlatformRequestFailed { operation: String, message: String },

    #[error("Platform {operation} request timed out after {timeout_ms}ms")]
    PlatformTimeout { operation: String, timeout_ms: u64 },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl LobbyBotError {
    /// Error for a poisoned registry or stats lock
    pub(crate) fn lock_poisoned(what: &str) -> Self {
        LobbyBotError::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}
