//! Lobby Bot - chat bot that gathers players for a game
//!
//! One lobby per chat location: a new-game command posts a join message
//! with Join and Leave buttons, and every membership change rewrites that
//! message. Platform events arrive over AMQP and platform calls go back
//! out the same way.

pub mod amqp;
pub mod bot;
pub mod config;
pub mod error;
pub mod lobby;
pub mod metrics;
pub mod platform;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LobbyBotError, Result};
pub use types::*;

// Re-export key components
pub use bot::{Dispatcher, LobbyHandlers};
pub use lobby::{Lobby, SessionRegistry};
pub use platform::{MockPlatformClient, PlatformClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
