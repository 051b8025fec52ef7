//! Capability traits consumed by the service layer.
//!
//! [`RoomRepository`] and [`TaskRepository`] are the durable side: room and
//! task identity survive restarts. [`LiveRoomStore`] holds the ephemeral
//! per-room session state (users, votes, reveal flag, active task). The
//! service façade depends only on these traits, so either side can be
//! replaced without touching the protocol handler.

use std::collections::HashMap;

use serde::Serialize;

use crate::errors::Result;
use crate::room::Room;
use crate::task::Task;
use crate::user::User;

/// Durable room storage. Rooms are never deleted.
pub trait RoomRepository: Send + Sync {
    /// Persist a new room. Fails with `RoomAlreadyExists` on a duplicate ID.
    fn create(&self, room: &Room) -> Result<()>;

    /// Load a room. Fails with `RoomNotFound`.
    fn get_by_id(&self, id: &str) -> Result<Room>;

    /// Overwrite name and settings. Fails with `RoomNotFound`.
    fn update(&self, room: &Room) -> Result<()>;

    /// Whether a room with this ID exists.
    fn exists(&self, id: &str) -> Result<bool>;
}

/// Durable task storage.
pub trait TaskRepository: Send + Sync {
    /// Persist a new task.
    fn create(&self, task: &Task) -> Result<()>;

    /// Load a task. Fails with `TaskNotFound`.
    fn get_by_id(&self, id: &str) -> Result<Task>;

    /// All tasks of a room, ordered by position.
    fn list_by_room(&self, room_id: &str) -> Result<Vec<Task>>;

    /// Overwrite headline, description, link and estimation.
    fn update(&self, task: &Task) -> Result<()>;

    /// Delete a task and shift every later task in its room up by one.
    fn delete(&self, id: &str) -> Result<()>;

    /// Rewrite positions atomically: `ordered_ids[i]` gets position `i + 1`.
    fn reorder(&self, room_id: &str, ordered_ids: &[String]) -> Result<()>;

    /// Lowest-positioned task whose estimation is unset, empty or `?`.
    fn next_unestimated(&self, room_id: &str) -> Result<Option<Task>>;
}

/// How [`LiveRoomStore::add_user`] treats a user ID that is already resident.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Reject with `UserAlreadyExists`.
    Strict,
    /// Replace the stale record, keeping any recorded vote. Each such join
    /// takes one session hold, released by [`LiveRoomStore::release_session`].
    Reconnect,
}

/// Independent snapshot of one live room.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LiveRoomState {
    /// Room ID.
    pub room_id: String,
    /// Resident users by ID.
    pub users: HashMap<String, User>,
    /// Recorded votes by user ID.
    pub votes: HashMap<String, String>,
    /// Whether votes have been revealed this round.
    pub is_revealed: bool,
    /// Free-text description of what is being estimated.
    pub task_description: String,
    /// Task currently under estimation.
    pub active_task_id: Option<String>,
}

/// Live-store counters for operational visibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Resident rooms.
    pub total_rooms: usize,
    /// Resident users across all rooms.
    pub total_users: usize,
    /// Reaper interval.
    pub cleanup_interval_secs: u64,
    /// Idle time after which an empty room is reaped.
    pub room_ttl_secs: u64,
}

/// Concurrency-safe table of live room state.
///
/// Every method may be called from many connection tasks at once. Reads
/// return copies; nothing hands out references into the table.
pub trait LiveRoomStore: Send + Sync {
    /// Insert an empty live room. Fails with `RoomAlreadyExists`.
    fn create_room(&self, room_id: &str) -> Result<()>;

    /// Whether the room is resident.
    fn room_exists(&self, room_id: &str) -> bool;

    /// Drop a resident room. Fails with `RoomNotFound`.
    fn delete_room(&self, room_id: &str) -> Result<()>;

    /// Deep copy of the room; refreshes its last-access time.
    fn get_state(&self, room_id: &str) -> Result<LiveRoomState>;

    /// Add a user under `policy`. The stored `is_voted` flag always reflects
    /// whether the vote map holds an entry for that ID.
    fn add_user(&self, room_id: &str, user: User, policy: JoinPolicy) -> Result<()>;

    /// Remove a user and their vote. Fails with `RoomNotFound` or `UserNotFound`.
    fn remove_user(&self, room_id: &str, user_id: &str) -> Result<()>;

    /// Drop one session hold on a user. The user and their vote go with the
    /// last hold; returns whether that happened. Fails with `RoomNotFound`
    /// or `UserNotFound`.
    fn release_session(&self, room_id: &str, user_id: &str) -> Result<bool>;

    /// Copy of one user.
    fn get_user(&self, room_id: &str, user_id: &str) -> Result<User>;

    /// Replace a resident user's record. Fails with `UserNotFound` if the
    /// user left in the meantime.
    fn update_user(&self, room_id: &str, user: User) -> Result<()>;

    /// Number of resident users.
    fn user_count(&self, room_id: &str) -> Result<usize>;

    /// Record a vote. The value is not validated here.
    fn submit_vote(&self, room_id: &str, user_id: &str, value: &str) -> Result<()>;

    /// Set the reveal flag. Idempotent.
    fn reveal_votes(&self, room_id: &str) -> Result<()>;

    /// Empty the votes, clear the reveal flag and the active task, reset every voted flag.
    fn clear_votes(&self, room_id: &str) -> Result<()>;

    /// Replace the free-text task description.
    fn update_task_description(&self, room_id: &str, description: &str) -> Result<()>;

    /// Point the room at a task; an empty ID clears the pointer.
    fn set_active_task(&self, room_id: &str, task_id: &str) -> Result<()>;

    /// Task currently under estimation.
    fn active_task(&self, room_id: &str) -> Result<Option<String>>;

    /// Store counters.
    fn stats(&self) -> StoreStats;
}
