//! Session registry mapping locations and join messages to lobbies
//!
//! The registry owns two indexes behind one read/write lock:
//! location -> join point slot, and join message handle -> lobby. The lock
//! is only held for short synchronous sections and never across an await
//! point; membership changes go through each lobby's own lock instead.
//!
//! Lobby creation is two-phase because the join message handle only exists
//! after the message has been posted. `reserve` claims the location with a
//! pending slot, the caller posts the message without any registry lock
//! held, and `PendingLobby::register` finishes the registration. Dropping
//! or abandoning a `PendingLobby` frees the location again.

use crate::error::{LobbyBotError, Result};
use crate::lobby::instance::Lobby;
use crate::types::{CommandInvoked, LobbyId, LocationId, MessageHandle};
use crate::utils::current_timestamp;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a location currently points at
#[derive(Debug, Clone, PartialEq, Eq)]
enum LocationSlot {
    /// Creation in flight, join message not posted yet
    Pending(LobbyId),
    /// Join message posted and lobby reachable by its handle
    Registered(MessageHandle),
}

/// Statistics about registry operations
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Total number of lobbies registered
    pub lobbies_created: u64,
    /// Creations abandoned because the join message could not be posted
    pub lobbies_abandoned: u64,
    /// Lobbies removed by idle reclamation
    pub lobbies_reclaimed: u64,
    /// New-game requests rejected because the location was taken
    pub duplicate_rejections: u64,
    /// Current number of registered lobbies
    pub active_lobbies: usize,
    /// Current number of creations in flight
    pub pending_lobbies: usize,
}

#[derive(Debug, Default)]
struct RegistryTables {
    by_location: HashMap<LocationId, LocationSlot>,
    by_handle: HashMap<MessageHandle, Arc<Lobby>>,
    stats: RegistryStats,
}

/// Result of a lobby creation attempt
#[derive(Debug)]
pub enum CreateOutcome {
    /// Join message posted and lobby registered
    Created {
        handle: MessageHandle,
        lobby: Arc<Lobby>,
    },
    /// The location already has a lobby (or one being created)
    AlreadyExists,
    /// Posting the join message failed; nothing was registered
    SendFailed(anyhow::Error),
}

impl CreateOutcome {
    pub fn created(&self) -> bool {
        matches!(self, CreateOutcome::Created { .. })
    }
}

/// Phase of a two-phase lobby creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationState {
    Pending,
    Registered,
    Abandoned,
}

/// A lobby whose location is reserved but whose join message is not
/// registered yet
#[derive(Debug)]
pub struct PendingLobby<'a> {
    registry: &'a SessionRegistry,
    lobby: Arc<Lobby>,
    state: CreationState,
}

impl<'a> PendingLobby<'a> {
    /// The lobby being created, used to render the initial join message
    pub fn lobby(&self) -> &Arc<Lobby> {
        &self.lobby
    }

    pub fn state(&self) -> CreationState {
        self.state
    }

    /// Register the posted join message: `Pending -> Registered`
    pub fn register(mut self, handle: MessageHandle) -> Result<Arc<Lobby>> {
        self.registry.finish_registration(&self.lobby, handle)?;
        self.state = CreationState::Registered;
        Ok(self.lobby.clone())
    }

    /// Give up on the creation: `Pending -> Abandoned`
    pub fn abandon(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.state != CreationState::Pending {
            return;
        }
        self.state = CreationState::Abandoned;
        self.registry.release_reservation(&self.lobby);
    }
}

impl Drop for PendingLobby<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Process-wide table of lobbies
#[derive(Debug, Default)]
pub struct SessionRegistry {
    tables: RwLock<RegistryTables>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_tables(&self) -> Result<RwLockReadGuard<'_, RegistryTables>> {
        self.tables
            .read()
            .map_err(|_| LobbyBotError::lock_poisoned("registry").into())
    }

    fn write_tables(&self) -> Result<RwLockWriteGuard<'_, RegistryTables>> {
        self.tables
            .write()
            .map_err(|_| LobbyBotError::lock_poisoned("registry").into())
    }

    /// Claim the origin's location for a new lobby.
    ///
    /// Returns `None` if the location already has a lobby, registered or
    /// pending.
    pub fn reserve(&self, origin: CommandInvoked) -> Result<Option<PendingLobby<'_>>> {
        let mut tables = self.write_tables()?;

        if let Some(slot) = tables.by_location.get(&origin.location) {
            debug!(
                "Location '{}' already has a lobby ({:?}), rejecting reservation",
                origin.location, slot
            );
            tables.stats.duplicate_rejections += 1;
            return Ok(None);
        }

        let lobby = Arc::new(Lobby::new(origin));
        tables.by_location.insert(
            lobby.location().to_string(),
            LocationSlot::Pending(lobby.id()),
        );

        debug!(
            "Reserved location '{}' for lobby {}",
            lobby.location(),
            lobby.id()
        );

        Ok(Some(PendingLobby {
            registry: self,
            lobby,
            state: CreationState::Pending,
        }))
    }

    fn finish_registration(&self, lobby: &Arc<Lobby>, handle: MessageHandle) -> Result<()> {
        let mut tables = self.write_tables()?;

        match tables.by_location.get(lobby.location()) {
            Some(LocationSlot::Pending(id)) if *id == lobby.id() => {}
            other => {
                return Err(LobbyBotError::InternalError {
                    message: format!(
                        "Reservation for lobby {} in '{}' was lost (slot: {:?})",
                        lobby.id(),
                        lobby.location(),
                        other
                    ),
                }
                .into());
            }
        }

        if tables.by_handle.contains_key(&handle) {
            return Err(LobbyBotError::InternalError {
                message: format!("Join message {} is already registered", handle),
            }
            .into());
        }

        lobby.bind_handle(handle.clone());
        tables.by_location.insert(
            lobby.location().to_string(),
            LocationSlot::Registered(handle.clone()),
        );
        tables.by_handle.insert(handle.clone(), lobby.clone());
        tables.stats.lobbies_created += 1;

        info!(
            "Registered lobby {} - location: '{}', handle: {}, total_created: {}",
            lobby.id(),
            lobby.location(),
            handle,
            tables.stats.lobbies_created
        );
        Ok(())
    }

    fn release_reservation(&self, lobby: &Lobby) {
        let Ok(mut tables) = self.tables.write() else {
            warn!(
                "Registry lock poisoned, cannot release reservation for '{}'",
                lobby.location()
            );
            return;
        };

        if tables.by_location.get(lobby.location()) == Some(&LocationSlot::Pending(lobby.id())) {
            tables.by_location.remove(lobby.location());
            tables.stats.lobbies_abandoned += 1;
            debug!(
                "Released reservation for lobby {} in '{}'",
                lobby.id(),
                lobby.location()
            );
        }
    }

    /// Create a lobby for the origin's location.
    ///
    /// `send` posts the initial join message and returns its handle. It runs
    /// without the registry lock held; the lobby is registered only if it
    /// succeeds.
    pub async fn create_lobby<F, Fut>(&self, origin: CommandInvoked, send: F) -> Result<CreateOutcome>
    where
        F: FnOnce(Arc<Lobby>) -> Fut,
        Fut: Future<Output = Result<MessageHandle>>,
    {
        let Some(pending) = self.reserve(origin)? else {
            return Ok(CreateOutcome::AlreadyExists);
        };

        match send(pending.lobby().clone()).await {
            Ok(handle) => {
                let lobby = pending.register(handle.clone())?;
                Ok(CreateOutcome::Created { handle, lobby })
            }
            Err(e) => {
                pending.abandon();
                Ok(CreateOutcome::SendFailed(e))
            }
        }
    }

    /// Resolve a location to its registered lobby
    pub fn lookup(&self, location: &str) -> Result<Option<Arc<Lobby>>> {
        let tables = self.read_tables()?;

        let lobby = match tables.by_location.get(location) {
            Some(LocationSlot::Registered(handle)) => tables.by_handle.get(handle).cloned(),
            _ => None,
        };
        Ok(lobby)
    }

    /// Resolve a join message handle to its lobby
    pub fn lookup_handle(&self, handle: &str) -> Result<Option<Arc<Lobby>>> {
        let tables = self.read_tables()?;
        Ok(tables.by_handle.get(handle).cloned())
    }

    /// Join message handle registered for a location
    pub fn handle_for(&self, location: &str) -> Result<Option<MessageHandle>> {
        let tables = self.read_tables()?;

        let handle = match tables.by_location.get(location) {
            Some(LocationSlot::Registered(handle)) => Some(handle.clone()),
            _ => None,
        };
        Ok(handle)
    }

    /// All registered lobbies
    pub fn lobbies(&self) -> Result<Vec<Arc<Lobby>>> {
        let tables = self.read_tables()?;
        Ok(tables.by_handle.values().cloned().collect())
    }

    pub fn active_lobbies(&self) -> Result<usize> {
        Ok(self.read_tables()?.by_handle.len())
    }

    /// Get registry statistics
    pub fn stats(&self) -> Result<RegistryStats> {
        let tables = self.read_tables()?;

        let mut stats = tables.stats.clone();
        stats.active_lobbies = tables.by_handle.len();
        stats.pending_lobbies = tables
            .by_location
            .values()
            .filter(|slot| matches!(slot, LocationSlot::Pending(_)))
            .count();
        Ok(stats)
    }

    /// Cancel and unregister lobbies that have seen no membership change for
    /// `idle_timeout`. Returns the lobbies reclaimed.
    ///
    /// Each lobby is cancelled under its own lock first, so joins that race
    /// with reclamation are refused. The registry lock is taken afterwards.
    pub async fn reclaim_idle(&self, idle_timeout: Duration) -> Result<Vec<Arc<Lobby>>> {
        // A timeout reaching past the representable past means nothing is idle yet
        let Some(cutoff) = chrono::Duration::from_std(idle_timeout)
            .ok()
            .and_then(|timeout| current_timestamp().checked_sub_signed(timeout))
        else {
            debug!("Idle timeout {:?} out of range, nothing to reclaim", idle_timeout);
            return Ok(Vec::new());
        };

        let mut cancelled = Vec::new();
        for lobby in self.lobbies()? {
            let mut roster = lobby.lock().await;
            if roster.last_activity() < cutoff && roster.mark_cancelled() {
                debug!(
                    "Cancelled idle lobby {} in '{}' ({} members)",
                    lobby.id(),
                    lobby.location(),
                    roster.len()
                );
                cancelled.push(lobby.clone());
            }
        }

        if cancelled.is_empty() {
            return Ok(Vec::new());
        }

        let mut tables = self.write_tables()?;
        let mut reclaimed = Vec::with_capacity(cancelled.len());

        for lobby in cancelled {
            let Some(handle) = lobby.handle() else {
                continue;
            };

            let same_lobby = tables
                .by_handle
                .get(handle)
                .is_some_and(|registered| registered.id() == lobby.id());
            if !same_lobby {
                continue;
            }

            tables.by_handle.remove(handle);
            if tables.by_location.get(lobby.location())
                == Some(&LocationSlot::Registered(handle.to_string()))
            {
                tables.by_location.remove(lobby.location());
            }
            reclaimed.push(lobby);
        }

        tables.stats.lobbies_reclaimed += reclaimed.len() as u64;
        info!(
            "Reclaimed {} idle lobbies - active: {}",
            reclaimed.len(),
            tables.by_handle.len()
        );

        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::instance::LobbyState;
    use crate::types::InteractionRef;
    use anyhow::anyhow;

    fn create_test_origin(location: &str, interaction_id: &str) -> CommandInvoked {
        CommandInvoked {
            interaction: InteractionRef {
                id: interaction_id.to_string(),
                token: "token".to_string(),
            },
            command_name: "new-game".to_string(),
            location: location.to_string(),
            user_id: "host".to_string(),
        }
    }

    async fn create_registered(registry: &SessionRegistry, location: &str, handle: &str) -> Arc<Lobby> {
        let handle = handle.to_string();
        let outcome = registry
            .create_lobby(create_test_origin(location, "i-1"), |_| async move { Ok(handle) })
            .await
            .unwrap();

        match outcome {
            CreateOutcome::Created { lobby, .. } => lobby,
            other => panic!("Expected lobby to be created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_registers_both_indexes() {
        let registry = SessionRegistry::new();
        let lobby = create_registered(&registry, "chan1", "H1").await;

        assert_eq!(lobby.handle(), Some("H1"));
        assert_eq!(registry.handle_for("chan1").unwrap(), Some("H1".to_string()));

        let by_location = registry.lookup("chan1").unwrap().unwrap();
        let by_handle = registry.lookup_handle("H1").unwrap().unwrap();
        assert_eq!(by_location.id(), lobby.id());
        assert_eq!(by_handle.id(), lobby.id());

        let stats = registry.stats().unwrap();
        assert_eq!(stats.lobbies_created, 1);
        assert_eq!(stats.active_lobbies, 1);
        assert_eq!(stats.pending_lobbies, 0);
    }

    #[tokio::test]
    async fn test_second_create_in_location_is_rejected() {
        let registry = SessionRegistry::new();
        let first = create_registered(&registry, "chan1", "H1").await;

        let outcome = registry
            .create_lobby(create_test_origin("chan1", "i-2"), |_| async {
                Err(anyhow!("join message must not be sent for a duplicate lobby"))
            })
            .await
            .unwrap();

        assert!(!outcome.created());
        assert!(matches!(outcome, CreateOutcome::AlreadyExists));
        assert_eq!(registry.lookup("chan1").unwrap().unwrap().id(), first.id());
        assert_eq!(registry.stats().unwrap().duplicate_rejections, 1);
    }

    #[tokio::test]
    async fn test_other_locations_are_independent() {
        let registry = SessionRegistry::new();
        create_registered(&registry, "chan1", "H1").await;
        create_registered(&registry, "chan2", "H2").await;

        assert_eq!(registry.active_lobbies().unwrap(), 2);
        assert!(registry.lookup("chan3").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_send_frees_location() {
        let registry = SessionRegistry::new();

        let outcome = registry
            .create_lobby(create_test_origin("chan1", "i-1"), |_| async {
                Err(anyhow!("platform unavailable"))
            })
            .await
            .unwrap();

        assert!(matches!(outcome, CreateOutcome::SendFailed(_)));
        assert!(registry.lookup("chan1").unwrap().is_none());
        assert!(registry.handle_for("chan1").unwrap().is_none());

        let stats = registry.stats().unwrap();
        assert_eq!(stats.lobbies_abandoned, 1);
        assert_eq!(stats.active_lobbies, 0);

        // Location can be used again
        create_registered(&registry, "chan1", "H2").await;
        assert!(registry.lookup("chan1").unwrap().is_some());
    }

    #[test]
    fn test_pending_reservation_blocks_and_drop_releases() {
        let registry = SessionRegistry::new();

        let pending = registry
            .reserve(create_test_origin("chan1", "i-1"))
            .unwrap()
            .unwrap();
        assert_eq!(pending.state(), CreationState::Pending);

        // Pending slots block new reservations but are not visible to lookups
        assert!(registry
            .reserve(create_test_origin("chan1", "i-2"))
            .unwrap()
            .is_none());
        assert!(registry.lookup("chan1").unwrap().is_none());
        assert_eq!(registry.stats().unwrap().pending_lobbies, 1);

        drop(pending);

        assert_eq!(registry.stats().unwrap().pending_lobbies, 0);
        assert!(registry
            .reserve(create_test_origin("chan1", "i-3"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_duplicate_handle_is_rejected() {
        let registry = SessionRegistry::new();

        let first = registry
            .reserve(create_test_origin("chan1", "i-1"))
            .unwrap()
            .unwrap();
        first.register("H1".to_string()).unwrap();

        let second = registry
            .reserve(create_test_origin("chan2", "i-2"))
            .unwrap()
            .unwrap();
        assert!(second.register("H1".to_string()).is_err());

        // The failed registration released chan2
        assert!(registry.lookup("chan2").unwrap().is_none());
        assert!(registry
            .reserve(create_test_origin("chan2", "i-3"))
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_yield_one_lobby() {
        let registry = Arc::new(SessionRegistry::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(32));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    registry
                        .create_lobby(create_test_origin("chan1", &format!("i-{}", i)), |_| async move {
                            tokio::task::yield_now().await;
                            Ok(format!("H{}", i))
                        })
                        .await
                        .unwrap()
                        .created()
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(registry.active_lobbies().unwrap(), 1);
        assert_eq!(registry.stats().unwrap().duplicate_rejections, 31);
    }

    #[tokio::test]
    async fn test_reclaim_idle_lobbies() {
        let registry = SessionRegistry::new();
        let idle = create_registered(&registry, "chan1", "H1").await;
        let busy = create_registered(&registry, "chan2", "H2").await;

        idle.lock()
            .await
            .set_last_activity(current_timestamp() - chrono::Duration::hours(2));
        busy.join("alice").await;

        let reclaimed = registry.reclaim_idle(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id(), idle.id());

        assert_eq!(idle.state().await, LobbyState::Cancelled);
        assert!(!idle.join("bob").await);
        assert!(registry.lookup("chan1").unwrap().is_none());
        assert!(registry.lookup_handle("H1").unwrap().is_none());

        assert_eq!(busy.state().await, LobbyState::Open);
        assert!(registry.lookup("chan2").unwrap().is_some());

        let stats = registry.stats().unwrap();
        assert_eq!(stats.lobbies_reclaimed, 1);
        assert_eq!(stats.active_lobbies, 1);

        // A new lobby can be started where the idle one was
        create_registered(&registry, "chan1", "H3").await;
    }

    #[tokio::test]
    async fn test_reclaim_with_huge_timeout_keeps_lobbies() {
        let registry = SessionRegistry::new();
        let lobby = create_registered(&registry, "chan1", "H1").await;
        lobby
            .lock()
            .await
            .set_last_activity(current_timestamp() - chrono::Duration::hours(2));

        let reclaimed = registry
            .reclaim_idle(Duration::from_secs(10_000_000_000_000))
            .await
            .unwrap();
        assert!(reclaimed.is_empty());

        let reclaimed = registry.reclaim_idle(Duration::MAX).await.unwrap();
        assert!(reclaimed.is_empty());

        assert_eq!(lobby.state().await, LobbyState::Open);
        assert!(registry.lookup("chan1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reclaim_with_nothing_idle() {
        let registry = SessionRegistry::new();
        create_registered(&registry, "chan1", "H1").await;

        let reclaimed = registry.reclaim_idle(Duration::from_secs(60)).await.unwrap();
        assert!(reclaimed.is_empty());
        assert_eq!(registry.active_lobbies().unwrap(), 1);
    }
}
