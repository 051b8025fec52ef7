//! In-memory live room table with background eviction.
//!
//! One `RwLock` guards the whole table. Every operation holds it for its full
//! duration, including the copy made by [`LiveRoomStore::get_state`], and no
//! reference into the table ever escapes the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use estimo_core::{
    EstimoError, JoinPolicy, LiveRoomState, LiveRoomStore, Result, StoreStats, User,
};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reaper timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReaperConfig {
    /// How often the reaper sweeps the table.
    pub cleanup_interval: Duration,
    /// Idle time after which an empty room is dropped.
    pub room_ttl: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(600),
            room_ttl: Duration::from_secs(86_400),
        }
    }
}

struct LiveRoom {
    state: LiveRoomState,
    /// Open socket sessions per user ID.
    sessions: HashMap<String, usize>,
    last_access: Instant,
}

impl LiveRoom {
    fn new(room_id: &str) -> Self {
        Self {
            state: LiveRoomState {
                room_id: room_id.to_owned(),
                ..LiveRoomState::default()
            },
            sessions: HashMap::new(),
            last_access: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    fn user_mut(&mut self, user_id: &str) -> Result<&mut User> {
        self.state
            .users
            .get_mut(user_id)
            .ok_or_else(|| EstimoError::UserNotFound(user_id.to_owned()))
    }
}

/// Concurrency-safe live room table.
pub struct RoomStateStore {
    rooms: RwLock<HashMap<String, LiveRoom>>,
    config: ReaperConfig,
}

impl RoomStateStore {
    /// Create an empty store.
    pub fn new(config: ReaperConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Run `f` against one room under the write lock, refreshing its last-access time.
    fn with_room<T>(&self, room_id: &str, f: impl FnOnce(&mut LiveRoom) -> Result<T>) -> Result<T> {
        let mut rooms = self.rooms.write();
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| EstimoError::RoomNotFound(room_id.to_owned()))?;
        room.touch();
        f(room)
    }

    /// Drop every room that has no users and has been idle longer than the TTL.
    ///
    /// Returns the number of rooms removed.
    pub fn reap_idle(&self) -> usize {
        let ttl = self.config.room_ttl;
        let now = Instant::now();
        let mut rooms = self.rooms.write();
        let before = rooms.len();
        rooms.retain(|room_id, room| {
            let idle = now.saturating_duration_since(room.last_access);
            let keep = !room.state.users.is_empty() || idle <= ttl;
            if !keep {
                debug!(room_id = %room_id, idle_secs = idle.as_secs(), "reaping idle room");
            }
            keep
        });
        before - rooms.len()
    }

    /// Spawn the periodic reaper. It stops when `cancel` fires.
    pub fn spawn_reaper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let period = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            let _ = interval.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("room reaper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let removed = store.reap_idle();
                        if removed > 0 {
                            info!(removed, remaining = store.rooms.read().len(), "reaped idle rooms");
                        } else {
                            debug!("reaper sweep found nothing to remove");
                        }
                    }
                }
            }
        })
    }
}

impl Default for RoomStateStore {
    fn default() -> Self {
        Self::new(ReaperConfig::default())
    }
}

impl LiveRoomStore for RoomStateStore {
    fn create_room(&self, room_id: &str) -> Result<()> {
        let mut rooms = self.rooms.write();
        if rooms.contains_key(room_id) {
            return Err(EstimoError::RoomAlreadyExists(room_id.to_owned()));
        }
        let _ = rooms.insert(room_id.to_owned(), LiveRoom::new(room_id));
        debug!(room_id, "live room created");
        Ok(())
    }

    fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.read().contains_key(room_id)
    }

    fn delete_room(&self, room_id: &str) -> Result<()> {
        self.rooms
            .write()
            .remove(room_id)
            .map(|_| ())
            .ok_or_else(|| EstimoError::RoomNotFound(room_id.to_owned()))
    }

    fn get_state(&self, room_id: &str) -> Result<LiveRoomState> {
        self.with_room(room_id, |room| Ok(room.state.clone()))
    }

    fn add_user(&self, room_id: &str, mut user: User, policy: JoinPolicy) -> Result<()> {
        self.with_room(room_id, |room| {
            let resident = room.state.users.contains_key(&user.id);
            if resident && policy == JoinPolicy::Strict {
                return Err(EstimoError::UserAlreadyExists(user.id));
            }
            user.is_voted = room.state.votes.contains_key(&user.id);
            user.is_online = true;
            if policy == JoinPolicy::Reconnect {
                *room.sessions.entry(user.id.clone()).or_default() += 1;
            }
            debug!(room_id, user_id = %user.id, rejoin = resident, voted = user.is_voted, "user added");
            let _ = room.state.users.insert(user.id.clone(), user);
            Ok(())
        })
    }

    fn remove_user(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.with_room(room_id, |room| {
            if room.state.users.remove(user_id).is_none() {
                return Err(EstimoError::UserNotFound(user_id.to_owned()));
            }
            let _ = room.state.votes.remove(user_id);
            let _ = room.sessions.remove(user_id);
            Ok(())
        })
    }

    fn release_session(&self, room_id: &str, user_id: &str) -> Result<bool> {
        self.with_room(room_id, |room| {
            if !room.state.users.contains_key(user_id) {
                return Err(EstimoError::UserNotFound(user_id.to_owned()));
            }
            let remaining = room.sessions.get_mut(user_id).map_or(0, |held| {
                *held = held.saturating_sub(1);
                *held
            });
            if remaining > 0 {
                debug!(room_id, user_id, remaining, "session released, user still held");
                return Ok(false);
            }
            let _ = room.state.users.remove(user_id);
            let _ = room.state.votes.remove(user_id);
            let _ = room.sessions.remove(user_id);
            Ok(true)
        })
    }

    fn get_user(&self, room_id: &str, user_id: &str) -> Result<User> {
        self.with_room(room_id, |room| room.user_mut(user_id).cloned())
    }

    fn update_user(&self, room_id: &str, mut user: User) -> Result<()> {
        self.with_room(room_id, |room| {
            user.is_voted = room.state.votes.contains_key(&user.id);
            user.is_online = true;
            let user_id = user.id.clone();
            *room.user_mut(&user_id)? = user;
            Ok(())
        })
    }

    fn user_count(&self, room_id: &str) -> Result<usize> {
        self.with_room(room_id, |room| Ok(room.state.users.len()))
    }

    fn submit_vote(&self, room_id: &str, user_id: &str, value: &str) -> Result<()> {
        self.with_room(room_id, |room| {
            room.user_mut(user_id)?.is_voted = true;
            let _ = room
                .state
                .votes
                .insert(user_id.to_owned(), value.to_owned());
            Ok(())
        })
    }

    fn reveal_votes(&self, room_id: &str) -> Result<()> {
        self.with_room(room_id, |room| {
            room.state.is_revealed = true;
            Ok(())
        })
    }

    fn clear_votes(&self, room_id: &str) -> Result<()> {
        self.with_room(room_id, |room| {
            room.state.votes.clear();
            room.state.is_revealed = false;
            room.state.active_task_id = None;
            for user in room.state.users.values_mut() {
                user.is_voted = false;
            }
            Ok(())
        })
    }

    fn update_task_description(&self, room_id: &str, description: &str) -> Result<()> {
        self.with_room(room_id, |room| {
            description.clone_into(&mut room.state.task_description);
            Ok(())
        })
    }

    fn set_active_task(&self, room_id: &str, task_id: &str) -> Result<()> {
        self.with_room(room_id, |room| {
            room.state.active_task_id = (!task_id.is_empty()).then(|| task_id.to_owned());
            Ok(())
        })
    }

    fn active_task(&self, room_id: &str) -> Result<Option<String>> {
        self.with_room(room_id, |room| Ok(room.state.active_task_id.clone()))
    }

    fn stats(&self) -> StoreStats {
        let rooms = self.rooms.read();
        StoreStats {
            total_rooms: rooms.len(),
            total_users: rooms.values().map(|r| r.state.users.len()).sum(),
            cleanup_interval_secs: self.config.cleanup_interval.as_secs(),
            room_ttl_secs: self.config.room_ttl.as_secs(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
