//! # estimo-service
//!
//! Thin orchestration over the estimo ports. Every service:
//!
//! - rejects empty room and user IDs with `InvalidInput`
//! - validates input before touching the live store, so a rejected call
//!   never leaves a partial mutation behind
//! - lazily re-creates the live room for a room that the durable repository
//!   knows but the live store has forgotten (after a restart or a reap)
//!
//! [`AppServices`] bundles the four services for injection into the HTTP
//! and WebSocket layers.

#![deny(unsafe_code)]

pub mod rooms;
pub mod tasks;
pub mod users;
pub mod views;
pub mod voting;

use std::sync::Arc;

use estimo_core::{
    EstimoError, LiveRoomStore, Result, Room, RoomRepository, TaskRepository,
};
use tracing::debug;

pub use rooms::RoomService;
pub use tasks::{TaskService, TaskUpdate};
pub use users::UserService;
pub use views::{RevealOutcome, RoomStateView, VoteView};
pub use voting::VotingService;

/// All services, sharing one set of ports.
#[derive(Clone)]
pub struct AppServices {
    /// Room lifecycle and live-state reads.
    pub rooms: RoomService,
    /// Join, leave, rename.
    pub users: UserService,
    /// Vote, reveal, clear.
    pub voting: VotingService,
    /// Task list management and estimation bookkeeping.
    pub tasks: TaskService,
}

impl AppServices {
    /// Wire the services over the given ports.
    pub fn new(
        room_repo: Arc<dyn RoomRepository>,
        task_repo: Arc<dyn TaskRepository>,
        live: Arc<dyn LiveRoomStore>,
    ) -> Self {
        Self {
            rooms: RoomService::new(room_repo.clone(), task_repo.clone(), live.clone()),
            users: UserService::new(room_repo.clone(), live.clone()),
            voting: VotingService::new(room_repo.clone(), live),
            tasks: TaskService::new(room_repo, task_repo),
        }
    }
}

pub(crate) fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EstimoError::invalid(format!("{what} is required")));
    }
    Ok(())
}

/// Load the durable room and make sure its live counterpart is resident.
///
/// A concurrent creator winning the race is not an error.
pub(crate) fn hydrate(
    repo: &dyn RoomRepository,
    live: &dyn LiveRoomStore,
    room_id: &str,
) -> Result<Room> {
    require(room_id, "room id")?;
    let room = repo.get_by_id(room_id)?;
    if !live.room_exists(room_id) {
        match live.create_room(room_id) {
            Ok(()) => debug!(room_id, "live room re-created from repository"),
            Err(EstimoError::RoomAlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(room)
}


#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use estimo_core::RoomSettings;
    use test_support::fixture;

    #[test]
    fn hydrate_recreates_forgotten_room() {
        let fx = fixture();
        let room = Room::new("R", RoomSettings::default()).unwrap();
        fx.rooms.create(&room).unwrap();
        assert!(!fx.live.room_exists(&room.id));

        let _ = hydrate(fx.rooms.as_ref(), fx.live.as_ref(), &room.id).unwrap();
        assert!(fx.live.room_exists(&room.id));

        // Second touch finds it resident
        let _ = hydrate(fx.rooms.as_ref(), fx.live.as_ref(), &room.id).unwrap();
        assert_eq!(fx.live.stats().total_rooms, 1);
    }

    #[test]
    fn hydrate_unknown_room() {
        let fx = fixture();
        assert_matches!(
            hydrate(fx.rooms.as_ref(), fx.live.as_ref(), "nope"),
            Err(EstimoError::RoomNotFound(_))
        );
        assert!(!fx.live.room_exists("nope"));
    }

    #[test]
    fn hydrate_rejects_blank_id() {
        let fx = fixture();
        assert_matches!(
            hydrate(fx.rooms.as_ref(), fx.live.as_ref(), "  "),
            Err(EstimoError::InvalidInput(_))
        );
    }
}
