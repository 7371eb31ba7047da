//! Handlers for the lobby commands and buttons
//!
//! New-game creates a lobby and posts its join message; Join and Leave
//! change the roster and rewrite the join message while still holding the
//! lobby lock, so the message always shows the roster as of the last
//! applied change.

use crate::bot::commands::ComponentAction;
use crate::config::LobbySettings;
use crate::error::Result;
use crate::lobby::render::{self, ALREADY_RUNNING_MESSAGE};
use crate::lobby::{CreateOutcome, SessionRegistry};
use crate::metrics::MetricsCollector;
use crate::platform::PlatformClient;
use crate::types::{
    CommandInvoked, ComponentInteracted, InteractionRef, MessageHandle, OutboundMessage,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reply to the ping command
pub const PONG_MESSAGE: &str = "Pong";

/// Result of a new-game command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewGameOutcome {
    /// Join message posted and lobby registered
    Created { handle: MessageHandle },
    /// The location already had a lobby; the user was told so privately
    AlreadyRunning,
    /// The join message could not be posted; nothing was registered
    Failed,
}

/// Result of a join or leave click
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipOutcome {
    /// Roster changed. `rendered` is the new join message content and
    /// `delivered` tells whether the edit reached the platform.
    Applied { rendered: String, delivered: bool },
    /// Already a member (join) or not a member (leave)
    Unchanged,
    /// The lobby no longer accepts membership changes
    LobbyClosed,
    /// No lobby in the location
    NoLobby,
    /// The clicked message is not the location's current join message
    Stale,
}

/// Lobby command and button handlers
pub struct LobbyHandlers {
    registry: Arc<SessionRegistry>,
    platform: Arc<dyn PlatformClient>,
    metrics: Arc<MetricsCollector>,
    settings: LobbySettings,
}

impl LobbyHandlers {
    pub fn new(
        registry: Arc<SessionRegistry>,
        platform: Arc<dyn PlatformClient>,
        metrics: Arc<MetricsCollector>,
        settings: LobbySettings,
    ) -> Self {
        Self {
            registry,
            platform,
            metrics,
            settings,
        }
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a lobby in the command's location
    pub async fn new_game(&self, command: &CommandInvoked) -> NewGameOutcome {
        let game_name = self.settings.game_name.as_str();
        let game_title = self.settings.game_title.as_str();

        let outcome = self
            .registry
            .create_lobby(command.clone(), move |lobby| async move {
                let members = lobby.members().await;
                let message = OutboundMessage::text(render::join_prompt(game_title, &members))
                    .with_components(render::lobby_controls(game_name));
                self.respond(&command.interaction, message).await
            })
            .await;

        match outcome {
            Ok(CreateOutcome::Created { handle, lobby }) => {
                self.metrics.record_lobby_created();
                info!(
                    "New game created - game: '{}', location: '{}', handle: {}, lobby: {}",
                    game_name,
                    command.location,
                    handle,
                    lobby.id()
                );
                NewGameOutcome::Created { handle }
            }
            Ok(CreateOutcome::AlreadyExists) => {
                self.metrics.record_duplicate_lobby();
                info!(
                    "Game already running - game: '{}', location: '{}', user: '{}'",
                    game_name, command.location, command.user_id
                );

                let notice = OutboundMessage::ephemeral(ALREADY_RUNNING_MESSAGE);
                if let Err(e) = self.respond(&command.interaction, notice).await {
                    error!(
                        "Error sending already-running notice - game: '{}', location: '{}', user: '{}': {}",
                        game_name, command.location, command.user_id, e
                    );
                }
                NewGameOutcome::AlreadyRunning
            }
            Ok(CreateOutcome::SendFailed(e)) => {
                self.metrics.record_lobby_abandoned();
                error!(
                    "Error sending join message - game: '{}', location: '{}', user: '{}': {}",
                    game_name, command.location, command.user_id, e
                );
                NewGameOutcome::Failed
            }
            Err(e) => {
                self.metrics.record_lobby_abandoned();
                error!(
                    "Failed to register lobby - game: '{}', location: '{}': {}",
                    game_name, command.location, e
                );
                NewGameOutcome::Failed
            }
        }
    }

    /// Add the clicking user to the lobby
    pub async fn join(&self, event: &ComponentInteracted) -> MembershipOutcome {
        self.change_membership(event, ComponentAction::Join).await
    }

    /// Remove the clicking user from the lobby
    pub async fn leave(&self, event: &ComponentInteracted) -> MembershipOutcome {
        self.change_membership(event, ComponentAction::Leave).await
    }

    /// Answer the ping command. Returns whether the reply was delivered.
    pub async fn ping(&self, command: &CommandInvoked) -> bool {
        match self
            .respond(&command.interaction, OutboundMessage::text(PONG_MESSAGE))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(
                    "Error sending ping reply - location: '{}', user: '{}': {}",
                    command.location, command.user_id, e
                );
                false
            }
        }
    }

    /// Reclaim lobbies idle for `idle_timeout` and mark their join messages
    /// closed. Returns the number of lobbies reclaimed.
    ///
    /// The closing edits are best effort and run with no lock held.
    pub async fn reclaim_idle(&self, idle_timeout: Duration) -> Result<usize> {
        let reclaimed = self.registry.reclaim_idle(idle_timeout).await?;
        if reclaimed.is_empty() {
            return Ok(0);
        }

        self.metrics.record_lobbies_reclaimed(reclaimed.len());
        let notice = render::closed_notice(&self.settings.game_title);

        for lobby in &reclaimed {
            let Some(handle) = lobby.handle() else {
                continue;
            };
            if let Err(e) = self.edit(lobby.location(), handle, &notice).await {
                warn!(
                    "Error closing join message - game: '{}', location: '{}', handle: {}: {}",
                    self.settings.game_name,
                    lobby.location(),
                    handle,
                    e
                );
            }
        }

        Ok(reclaimed.len())
    }

    async fn change_membership(
        &self,
        event: &ComponentInteracted,
        action: ComponentAction,
    ) -> MembershipOutcome {
        let game_name = self.settings.game_name.as_str();
        let action_label = action.suffix();

        let lobby = match self.registry.lookup(&event.location) {
            Ok(Some(lobby)) => lobby,
            Ok(None) => {
                warn!(
                    "User attempted to {} nonexistent game - game: '{}', user: '{}', location: '{}', handle: {}",
                    action_label, game_name, event.user_id, event.location, event.message_id
                );
                self.metrics.record_stale_interaction();
                self.metrics
                    .record_membership_change(action_label, "no_lobby", None);
                return MembershipOutcome::NoLobby;
            }
            Err(e) => {
                error!(
                    "Failed to look up lobby - game: '{}', location: '{}': {}",
                    game_name, event.location, e
                );
                self.metrics
                    .record_membership_change(action_label, "no_lobby", None);
                return MembershipOutcome::NoLobby;
            }
        };

        let Some(handle) = lobby.handle() else {
            return MembershipOutcome::NoLobby;
        };
        if handle != event.message_id {
            warn!(
                "User clicked a stale join message - game: '{}', user: '{}', location: '{}', handle: {}, current: {}",
                game_name, event.user_id, event.location, event.message_id, handle
            );
            self.metrics.record_stale_interaction();
            self.metrics
                .record_membership_change(action_label, "stale", None);
            return MembershipOutcome::Stale;
        }

        let mut roster = lobby.lock().await;

        if !roster.is_open() {
            debug!(
                "User attempted to {} a {} game - game: '{}', user: '{}', handle: {}",
                action_label,
                roster.state(),
                game_name,
                event.user_id,
                handle
            );
            self.metrics
                .record_membership_change(action_label, "closed", None);
            return MembershipOutcome::LobbyClosed;
        }

        let applied = match action {
            ComponentAction::Join => roster.join(&event.user_id),
            ComponentAction::Leave => roster.leave(&event.user_id),
        };

        if !applied {
            debug!(
                "Redundant {} ignored - game: '{}', user: '{}', handle: {}",
                action_label, game_name, event.user_id, handle
            );
            self.metrics
                .record_membership_change(action_label, "unchanged", None);
            return MembershipOutcome::Unchanged;
        }

        let members = roster.members();
        let rendered = render::join_prompt(&self.settings.game_title, &members);

        // Edit while the roster is locked so edits land in mutation order
        let delivered = match self.edit(&event.location, handle, &rendered).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Error updating join message - game: '{}', user: '{}', location: '{}', handle: {}: {}",
                    game_name, event.user_id, event.location, handle, e
                );
                false
            }
        };
        drop(roster);

        debug!(
            "User {} game - game: '{}', user: '{}', handle: {}, players: {}",
            match action {
                ComponentAction::Join => "joined",
                ComponentAction::Leave => "left",
            },
            game_name,
            event.user_id,
            handle,
            members.len()
        );
        self.metrics
            .record_membership_change(action_label, "applied", Some(members.len()));

        MembershipOutcome::Applied {
            rendered,
            delivered,
        }
    }

    async fn respond(
        &self,
        interaction: &InteractionRef,
        message: OutboundMessage,
    ) -> Result<MessageHandle> {
        let timer = self.metrics.start_timer();
        let result = self.platform.respond_with_message(interaction, message).await;
        self.metrics
            .record_platform_call("respond", result.is_ok(), timer.stop());
        result
    }

    async fn edit(&self, location: &str, handle: &str, content: &str) -> Result<()> {
        let timer = self.metrics.start_timer();
        let result = self.platform.edit_message(location, handle, content).await;
        self.metrics
            .record_platform_call("edit", result.is_ok(), timer.stop());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::LobbyState;
    use crate::platform::{MockPlatformClient, PlatformCall};
    use crate::types::ButtonStyle;

    struct Harness {
        handlers: LobbyHandlers,
        platform: Arc<MockPlatformClient>,
        registry: Arc<SessionRegistry>,
        metrics: Arc<MetricsCollector>,
    }

    fn harness() -> Harness {
        let platform = Arc::new(MockPlatformClient::new());
        let registry = Arc::new(SessionRegistry::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let handlers = LobbyHandlers::new(
            registry.clone(),
            platform.clone(),
            metrics.clone(),
            LobbySettings::default(),
        );

        Harness {
            handlers,
            platform,
            registry,
            metrics,
        }
    }

    fn new_game_command(location: &str, user: &str) -> CommandInvoked {
        CommandInvoked {
            interaction: InteractionRef {
                id: format!("cmd-{}", user),
                token: "tok".to_string(),
            },
            command_name: "new-game".to_string(),
            location: location.to_string(),
            user_id: user.to_string(),
        }
    }

    fn click(location: &str, user: &str, action: &str, handle: &str) -> ComponentInteracted {
        ComponentInteracted {
            interaction: InteractionRef {
                id: format!("click-{}-{}", user, action),
                token: "tok".to_string(),
            },
            component_id: format!("secret-hitler-{}", action),
            location: location.to_string(),
            user_id: user.to_string(),
            message_id: handle.to_string(),
        }
    }

    #[tokio::test]
    async fn test_new_game_posts_join_message_with_controls() {
        let h = harness();

        let outcome = h.handlers.new_game(&new_game_command("chan1", "host")).await;
        assert_eq!(
            outcome,
            NewGameOutcome::Created {
                handle: "msg-1".to_string()
            }
        );

        let calls = h.platform.calls();
        let PlatformCall::Responded { message, .. } = &calls[0] else {
            panic!("Expected a response, got {:?}", calls[0]);
        };
        assert_eq!(
            message.content,
            "A Secret Hitler game is starting. Join now!\nCurrent players:"
        );
        assert!(!message.ephemeral);
        assert_eq!(message.components.len(), 2);
        assert_eq!(message.components[0].custom_id, "secret-hitler-join");
        assert_eq!(message.components[1].style, ButtonStyle::Secondary);

        // The host is not a member until they click Join
        let lobby = h.registry.lookup("chan1").unwrap().unwrap();
        assert!(lobby.members().await.is_empty());
        assert_eq!(h.metrics.lobby().lobbies_created_total.get(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_new_game_gets_private_notice() {
        let h = harness();
        h.handlers.new_game(&new_game_command("chan1", "host")).await;

        let outcome = h.handlers.new_game(&new_game_command("chan1", "other")).await;
        assert_eq!(outcome, NewGameOutcome::AlreadyRunning);

        let notices = h.platform.ephemeral_responses();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].content, ALREADY_RUNNING_MESSAGE);
        assert_eq!(h.registry.handle_for("chan1").unwrap().unwrap(), "msg-1");
    }

    #[tokio::test]
    async fn test_failed_join_message_frees_location() {
        let h = harness();
        h.platform.set_fail_responses(true);

        let outcome = h.handlers.new_game(&new_game_command("chan1", "host")).await;
        assert_eq!(outcome, NewGameOutcome::Failed);
        assert!(h.registry.lookup("chan1").unwrap().is_none());

        h.platform.set_fail_responses(false);
        let outcome = h.handlers.new_game(&new_game_command("chan1", "host")).await;
        assert!(matches!(outcome, NewGameOutcome::Created { .. }));
    }

    #[tokio::test]
    async fn test_join_and_leave_rewrite_join_message() {
        let h = harness();
        h.handlers.new_game(&new_game_command("chan1", "host")).await;

        let outcome = h.handlers.join(&click("chan1", "alice", "join", "msg-1")).await;
        assert_eq!(
            outcome,
            MembershipOutcome::Applied {
                rendered: "A Secret Hitler game is starting. Join now!\nCurrent players: <@alice>"
                    .to_string(),
                delivered: true,
            }
        );

        h.handlers.join(&click("chan1", "bob", "join", "msg-1")).await;
        h.handlers.leave(&click("chan1", "alice", "leave", "msg-1")).await;

        assert_eq!(
            h.platform.current_content("msg-1").unwrap(),
            "A Secret Hitler game is starting. Join now!\nCurrent players: <@bob>"
        );
        assert_eq!(h.platform.edits_of("msg-1").len(), 3);
    }

    #[tokio::test]
    async fn test_redundant_membership_changes_are_silent() {
        let h = harness();
        h.handlers.new_game(&new_game_command("chan1", "host")).await;
        h.handlers.join(&click("chan1", "alice", "join", "msg-1")).await;
        h.platform.clear_calls();

        let again = h.handlers.join(&click("chan1", "alice", "join", "msg-1")).await;
        let outsider = h.handlers.leave(&click("chan1", "carol", "leave", "msg-1")).await;

        assert_eq!(again, MembershipOutcome::Unchanged);
        assert_eq!(outsider, MembershipOutcome::Unchanged);
        assert!(h.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_clicks_without_live_join_message_are_dropped() {
        let h = harness();

        let outcome = h.handlers.join(&click("chan1", "alice", "join", "msg-1")).await;
        assert_eq!(outcome, MembershipOutcome::NoLobby);

        h.handlers.new_game(&new_game_command("chan1", "host")).await;
        let outcome = h.handlers.join(&click("chan1", "alice", "join", "msg-old")).await;
        assert_eq!(outcome, MembershipOutcome::Stale);

        let lobby = h.registry.lookup("chan1").unwrap().unwrap();
        assert!(lobby.members().await.is_empty());
        assert_eq!(h.metrics.events().stale_interactions_total.get(), 2);
    }

    #[tokio::test]
    async fn test_edit_failure_keeps_membership() {
        let h = harness();
        h.handlers.new_game(&new_game_command("chan1", "host")).await;
        h.platform.set_fail_edits(true);

        let outcome = h.handlers.join(&click("chan1", "alice", "join", "msg-1")).await;
        assert!(matches!(
            outcome,
            MembershipOutcome::Applied {
                delivered: false,
                ..
            }
        ));

        let lobby = h.registry.lookup("chan1").unwrap().unwrap();
        assert_eq!(lobby.members().await, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_lobby_refuses_membership_changes() {
        let h = harness();
        h.handlers.new_game(&new_game_command("chan1", "host")).await;
        let lobby = h.registry.lookup("chan1").unwrap().unwrap();
        lobby.lock().await.mark_cancelled();

        let outcome = h.handlers.join(&click("chan1", "alice", "join", "msg-1")).await;
        assert_eq!(outcome, MembershipOutcome::LobbyClosed);
        assert_eq!(lobby.state().await, LobbyState::Cancelled);
    }

    #[tokio::test]
    async fn test_reclaim_closes_join_message() {
        let h = harness();
        h.handlers.new_game(&new_game_command("chan1", "host")).await;
        h.handlers.join(&click("chan1", "alice", "join", "msg-1")).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        let reclaimed = h.handlers.reclaim_idle(Duration::ZERO).await.unwrap();
        assert_eq!(reclaimed, 1);

        assert_eq!(
            h.platform.current_content("msg-1").unwrap(),
            "This Secret Hitler game lobby has closed."
        );
        assert!(h.registry.lookup("chan1").unwrap().is_none());
        assert_eq!(h.metrics.lobby().lobbies_reclaimed_total.get(), 1);
    }

    #[tokio::test]
    async fn test_reclaim_survives_failed_closing_edit() {
        let h = harness();
        h.handlers.new_game(&new_game_command("chan1", "host")).await;
        h.platform.set_fail_edits(true);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let reclaimed = h.handlers.reclaim_idle(Duration::ZERO).await.unwrap();
        assert_eq!(reclaimed, 1);
        assert!(h.registry.lookup("chan1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ping_replies_pong() {
        let h = harness();
        let mut command = new_game_command("chan1", "alice");
        command.command_name = "ping".to_string();

        assert!(h.handlers.ping(&command).await);
        assert_eq!(h.platform.current_content("msg-1").unwrap(), PONG_MESSAGE);
    }
}
