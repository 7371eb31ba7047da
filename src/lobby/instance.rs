//! Lobby instance and membership state
//!
//! A `Lobby` is shared between event handlers behind an `Arc`. Its roster
//! (members, state, activity) sits behind an async mutex because handlers
//! keep it locked while the updated membership is rendered to the platform.

use crate::types::{CommandInvoked, LobbyId, LocationId, MessageHandle, UserId};
use crate::utils::{current_timestamp, generate_lobby_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard};

/// Possible states of a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyState {
    /// Lobby is accepting joins and leaves
    Open,
    /// Game has started (not reached yet)
    Started,
    /// Lobby was reclaimed and no longer accepts changes (terminal state)
    Cancelled,
}

impl std::fmt::Display for LobbyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LobbyState::Open => write!(f, "Open"),
            LobbyState::Started => write!(f, "Started"),
            LobbyState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Roster entry that preserves join order
#[derive(Debug, Clone)]
struct Member {
    user_id: UserId,
    joined_at: DateTime<Utc>,
}

/// Mutable part of a lobby, only reachable through the lobby lock
#[derive(Debug)]
pub struct LobbyRoster {
    state: LobbyState,
    members: VecDeque<Member>,
    last_activity: DateTime<Utc>,
}

impl LobbyRoster {
    fn new() -> Self {
        Self {
            state: LobbyState::Open,
            members: VecDeque::new(),
            last_activity: current_timestamp(),
        }
    }

    /// Add a user. Returns false if the user is already a member or the
    /// lobby is no longer open.
    pub fn join(&mut self, user_id: &str) -> bool {
        if self.state != LobbyState::Open || self.contains(user_id) {
            return false;
        }

        self.members.push_back(Member {
            user_id: user_id.to_string(),
            joined_at: current_timestamp(),
        });
        self.last_activity = current_timestamp();
        true
    }

    /// Remove a user. Returns false if the user is not a member or the
    /// lobby is no longer open.
    pub fn leave(&mut self, user_id: &str) -> bool {
        if self.state != LobbyState::Open {
            return false;
        }

        let initial_len = self.members.len();
        self.members.retain(|member| member.user_id != user_id);

        if self.members.len() == initial_len {
            return false;
        }

        self.last_activity = current_timestamp();
        true
    }

    /// Check whether a user is a member
    pub fn contains(&self, user_id: &str) -> bool {
        self.members.iter().any(|member| member.user_id == user_id)
    }

    /// Members in join order
    pub fn members(&self) -> Vec<UserId> {
        self.members
            .iter()
            .map(|member| member.user_id.clone())
            .collect()
    }

    /// When a member joined, if they are in the lobby
    pub fn joined_at(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.members
            .iter()
            .find(|member| member.user_id == user_id)
            .map(|member| member.joined_at)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn state(&self) -> LobbyState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == LobbyState::Open
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Move an open lobby to `Cancelled`. Returns false if it was not open.
    pub fn mark_cancelled(&mut self) -> bool {
        if self.state != LobbyState::Open {
            return false;
        }
        self.state = LobbyState::Cancelled;
        true
    }

    /// Set last activity (for testing)
    #[cfg(test)]
    pub(crate) fn set_last_activity(&mut self, at: DateTime<Utc>) {
        self.last_activity = at;
    }
}

/// A pending game and its membership
#[derive(Debug)]
pub struct Lobby {
    id: LobbyId,
    location: LocationId,
    origin: CommandInvoked,
    handle: OnceLock<MessageHandle>,
    created_at: DateTime<Utc>,
    roster: Mutex<LobbyRoster>,
}

impl Lobby {
    /// Create an open, empty lobby for the command that requested it
    pub fn new(origin: CommandInvoked) -> Self {
        Self {
            id: generate_lobby_id(),
            location: origin.location.clone(),
            origin,
            handle: OnceLock::new(),
            created_at: current_timestamp(),
            roster: Mutex::new(LobbyRoster::new()),
        }
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// The command invocation that created this lobby
    pub fn origin(&self) -> &CommandInvoked {
        &self.origin
    }

    /// Handle of the join message, once the lobby is registered
    pub fn handle(&self) -> Option<&str> {
        self.handle.get().map(String::as_str)
    }

    /// Record the join message handle. Only the first call has an effect.
    pub(crate) fn bind_handle(&self, handle: MessageHandle) -> bool {
        self.handle.set(handle).is_ok()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Acquire the lobby lock. Hold the guard across the render call so the
    /// displayed membership matches the roster at the moment of the edit.
    pub async fn lock(&self) -> MutexGuard<'_, LobbyRoster> {
        self.roster.lock().await
    }

    /// Join without rendering
    pub async fn join(&self, user_id: &str) -> bool {
        self.lock().await.join(user_id)
    }

    /// Leave without rendering
    pub async fn leave(&self, user_id: &str) -> bool {
        self.lock().await.leave(user_id)
    }

    /// Snapshot of the members in join order
    pub async fn members(&self) -> Vec<UserId> {
        self.lock().await.members()
    }

    pub async fn state(&self) -> LobbyState {
        self.lock().await.state()
    }
}
