//! Test fixtures shared by the integration tests

#![allow(dead_code)]

use lobby_bot::bot::{Dispatcher, LobbyHandlers};
use lobby_bot::config::LobbySettings;
use lobby_bot::lobby::SessionRegistry;
use lobby_bot::metrics::MetricsCollector;
use lobby_bot::platform::{MockPlatformClient, PlatformClient};
use lobby_bot::types::{CommandInvoked, ComponentInteracted, InteractionRef, PlatformEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const GAME: &str = "secret-hitler";
pub const PROMPT: &str = "A Secret Hitler game is starting. Join now!\nCurrent players:";

/// Full handler stack wired to a platform client
pub struct TestSystem<P: PlatformClient + 'static> {
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<SessionRegistry>,
    pub platform: Arc<P>,
    pub metrics: Arc<MetricsCollector>,
}

/// Handler stack on top of the recording mock platform
pub fn create_test_system() -> TestSystem<MockPlatformClient> {
    create_system_with(Arc::new(MockPlatformClient::new()))
}

pub fn create_system_with<P: PlatformClient + 'static>(platform: Arc<P>) -> TestSystem<P> {
    let registry = Arc::new(SessionRegistry::new());
    let metrics = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
    let handlers = Arc::new(LobbyHandlers::new(
        registry.clone(),
        platform.clone(),
        metrics.clone(),
        LobbySettings::default(),
    ));

    TestSystem {
        dispatcher: Arc::new(Dispatcher::new(handlers, metrics.clone())),
        registry,
        platform,
        metrics,
    }
}

static NEXT_INTERACTION: AtomicU64 = AtomicU64::new(1);

fn interaction() -> InteractionRef {
    InteractionRef {
        id: format!("interaction-{}", NEXT_INTERACTION.fetch_add(1, Ordering::SeqCst)),
        token: "token".to_string(),
    }
}

pub fn command(name: &str, location: &str, user: &str) -> PlatformEvent {
    PlatformEvent::CommandInvoked(CommandInvoked {
        interaction: interaction(),
        command_name: name.to_string(),
        location: location.to_string(),
        user_id: user.to_string(),
    })
}

pub fn new_game(location: &str, user: &str) -> PlatformEvent {
    command("new-game", location, user)
}

pub fn click(component_id: &str, location: &str, user: &str, message_id: &str) -> PlatformEvent {
    PlatformEvent::ComponentInteracted(ComponentInteracted {
        interaction: interaction(),
        component_id: component_id.to_string(),
        location: location.to_string(),
        user_id: user.to_string(),
        message_id: message_id.to_string(),
    })
}

pub fn join(location: &str, user: &str, message_id: &str) -> PlatformEvent {
    click(&format!("{}-join", GAME), location, user, message_id)
}

pub fn leave(location: &str, user: &str, message_id: &str) -> PlatformEvent {
    click(&format!("{}-leave", GAME), location, user, message_id)
}

/// Expected join message content for the given members
pub fn prompt_with(members: &[&str]) -> String {
    let mut content = PROMPT.to_string();
    for member in members {
        content.push_str(&format!(" <@{}>", member));
    }
    content
}
