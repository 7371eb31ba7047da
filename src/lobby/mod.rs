//! Lobby state and the session registry
//!
//! This module holds pending games: the per-lobby membership roster, the
//! process-wide registry that maps locations and join messages to lobbies,
//! and the rendering of lobby state into message content.

pub mod instance;
pub mod registry;
pub mod render;

// Re-export commonly used types
pub use instance::{Lobby, LobbyRoster, LobbyState};
pub use registry::{CreateOutcome, CreationState, PendingLobby, RegistryStats, SessionRegistry};
