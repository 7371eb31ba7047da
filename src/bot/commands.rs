//! Routes understood by the bot
//!
//! Commands are keyed by their name, component actions by the custom id
//! carried on the lobby buttons (`<game>-join`, `<game>-leave`).

use crate::types::PlatformEvent;
use std::fmt;
use std::str::FromStr;

/// Slash commands handled by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    NewGame,
    Ping,
}

impl Command {
    pub const ALL: [Command; 2] = [Command::NewGame, Command::Ping];

    pub fn name(&self) -> &'static str {
        match self {
            Command::NewGame => "new-game",
            Command::Ping => "ping",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|command| command.name() == s)
            .ok_or(())
    }
}

/// Actions bound to the lobby buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentAction {
    Join,
    Leave,
}

impl ComponentAction {
    pub fn suffix(&self) -> &'static str {
        match self {
            ComponentAction::Join => "join",
            ComponentAction::Leave => "leave",
        }
    }

    /// Parse a component id of the form `<game>-<action>`
    pub fn parse(game_name: &str, component_id: &str) -> Option<Self> {
        let action = component_id
            .strip_prefix(game_name)?
            .strip_prefix('-')?;

        match action {
            "join" => Some(ComponentAction::Join),
            "leave" => Some(ComponentAction::Leave),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Where an inbound event goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    Component(ComponentAction),
    Unknown,
}

impl Route {
    /// Resolve an event to its route. Pure: no state is consulted.
    pub fn resolve(game_name: &str, event: &PlatformEvent) -> Self {
        match event {
            PlatformEvent::CommandInvoked(command) => command
                .command_name
                .parse()
                .map(Route::Command)
                .unwrap_or(Route::Unknown),
            PlatformEvent::ComponentInteracted(component) => {
                ComponentAction::parse(game_name, &component.component_id)
                    .map(Route::Component)
                    .unwrap_or(Route::Unknown)
            }
        }
    }

    /// Label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Route::Command(command) => command.name(),
            Route::Component(action) => action.suffix(),
            Route::Unknown => "unknown",
        }
    }
}
