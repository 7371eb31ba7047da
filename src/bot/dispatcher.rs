//! Event dispatch
//!
//! Resolves each inbound platform event to a route and hands it to the
//! matching handler. Events that match no route are logged and dropped.

use crate::amqp::EventHandler;
use crate::bot::commands::{Command, ComponentAction, Route};
use crate::bot::handlers::{LobbyHandlers, MembershipOutcome, NewGameOutcome};
use crate::error::LobbyBotError;
use crate::metrics::MetricsCollector;
use crate::types::PlatformEvent;
use crate::utils::payload_preview;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

const PREVIEW_LEN: usize = 200;

/// What happened to a dispatched event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    NewGame(NewGameOutcome),
    Join(MembershipOutcome),
    Leave(MembershipOutcome),
    /// Ping answered; the flag tells whether the reply was delivered
    Pong(bool),
    /// No route matched
    Dropped,
}

/// Routes platform events to the lobby handlers
pub struct Dispatcher {
    handlers: Arc<LobbyHandlers>,
    metrics: Arc<MetricsCollector>,
}

impl Dispatcher {
    pub fn new(handlers: Arc<LobbyHandlers>, metrics: Arc<MetricsCollector>) -> Self {
        Self { handlers, metrics }
    }

    pub fn handlers(&self) -> &Arc<LobbyHandlers> {
        &self.handlers
    }

    /// Route a single event and run its handler to completion
    pub async fn dispatch(&self, event: PlatformEvent) -> DispatchOutcome {
        let game_name = &self.handlers.settings().game_name;
        let route = Route::resolve(game_name, &event);
        let timer = self.metrics.start_timer();

        debug!(
            "Dispatching event - kind: {}, route: {}, location: '{}', user: '{}'",
            event.kind(),
            route.label(),
            event.location(),
            event.user_id()
        );

        let outcome = match (&event, route) {
            (PlatformEvent::CommandInvoked(command), Route::Command(Command::NewGame)) => {
                DispatchOutcome::NewGame(self.handlers.new_game(command).await)
            }
            (PlatformEvent::CommandInvoked(command), Route::Command(Command::Ping)) => {
                DispatchOutcome::Pong(self.handlers.ping(command).await)
            }
            (PlatformEvent::ComponentInteracted(click), Route::Component(ComponentAction::Join)) => {
                DispatchOutcome::Join(self.handlers.join(click).await)
            }
            (
                PlatformEvent::ComponentInteracted(click),
                Route::Component(ComponentAction::Leave),
            ) => DispatchOutcome::Leave(self.handlers.leave(click).await),
            _ => {
                warn!(
                    "Dropping event with unknown route - kind: {}, key: '{}', location: '{}'",
                    event.kind(),
                    event.route_key(),
                    event.location()
                );
                self.metrics.record_unknown_route(event.kind());
                DispatchOutcome::Dropped
            }
        };

        self.metrics
            .record_event(event.kind(), route.label(), timer.stop());
        outcome
    }
}

#[async_trait]
impl EventHandler for Dispatcher {
    async fn handle_event(&self, event: PlatformEvent) {
        self.metrics.record_amqp_message("accepted");
        self.dispatch(event).await;
    }

    async fn handle_error(&self, error: LobbyBotError, payload: &[u8]) {
        self.metrics.record_amqp_message("rejected");
        self.metrics.record_malformed_event();
        error!(
            "Rejected inbound payload: {} - payload: {}",
            error,
            payload_preview(payload, PREVIEW_LEN)
        );
    }
}
