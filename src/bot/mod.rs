//! Chat bot front end
//!
//! Routes platform events to the lobby handlers:
//! 1. `commands` maps command names and button ids to routes
//! 2. `dispatcher` resolves each event and runs its handler
//! 3. `handlers` implements new-game, join, leave and ping

pub mod commands;
pub mod dispatcher;
pub mod handlers;

// Re-export commonly used types
pub use commands::{Command, ComponentAction, Route};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use handlers::{LobbyHandlers, MembershipOutcome, NewGameOutcome, PONG_MESSAGE};
