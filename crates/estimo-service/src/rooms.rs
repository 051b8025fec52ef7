//! Room lifecycle and live-state reads.

use std::sync::Arc;

use estimo_core::vote::{calculate_average, has_only_non_numeric_votes};
use estimo_core::{
    EstimoError, LiveRoomState, LiveRoomStore, Result, Room, RoomRepository, RoomSettings,
    StoreStats, TaskRepository, VotingSystem,
};
use tracing::info;

use crate::views::{RoomStateView, room_state_view};
use crate::{hydrate, require};

/// Room service.
#[derive(Clone)]
pub struct RoomService {
    rooms: Arc<dyn RoomRepository>,
    tasks: Arc<dyn TaskRepository>,
    live: Arc<dyn LiveRoomStore>,
}

fn parse_voting_system(tag: Option<&str>) -> Result<VotingSystem> {
    match tag.map(str::trim) {
        None | Some("") => Ok(VotingSystem::default()),
        Some(tag) => VotingSystem::parse(tag),
    }
}

/// Mean for a revealed round, to two decimals; `None` without numeric signal.
pub(crate) fn revealed_average(state: &LiveRoomState, system: VotingSystem) -> Option<f64> {
    if state.votes.is_empty() {
        return None;
    }
    let average = (calculate_average(&state.votes, system).ok()? * 100.0).round() / 100.0;
    #[allow(clippy::float_cmp)]
    let no_signal = average == 0.0 && has_only_non_numeric_votes(&state.votes, system);
    (!no_signal).then_some(average)
}

impl RoomService {
    /// Create the service.
    pub fn new(
        rooms: Arc<dyn RoomRepository>,
        tasks: Arc<dyn TaskRepository>,
        live: Arc<dyn LiveRoomStore>,
    ) -> Self {
        Self { rooms, tasks, live }
    }

    /// Persist a new room and open its live state.
    pub fn create_room(
        &self,
        name: &str,
        voting_system: Option<&str>,
        auto_reveal: bool,
    ) -> Result<Room> {
        let settings = RoomSettings {
            voting_system: parse_voting_system(voting_system)?,
            auto_reveal,
        };
        let room = Room::new(name, settings)?;
        self.rooms.create(&room)?;
        match self.live.create_room(&room.id) {
            Ok(()) | Err(EstimoError::RoomAlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
        info!(room_id = %room.id, voting_system = %room.voting_system, "room created");
        Ok(room)
    }

    /// Load a room.
    pub fn get_room(&self, room_id: &str) -> Result<Room> {
        require(room_id, "room id")?;
        self.rooms.get_by_id(room_id)
    }

    /// Change a room's name and/or settings. `None` leaves a field as is.
    pub fn update_room(
        &self,
        room_id: &str,
        name: Option<&str>,
        voting_system: Option<&str>,
        auto_reveal: Option<bool>,
    ) -> Result<Room> {
        let mut room = self.get_room(room_id)?;
        if let Some(name) = name {
            room.update_name(name)?;
        }
        if voting_system.is_some() || auto_reveal.is_some() {
            let current = room.settings();
            room.update_settings(RoomSettings {
                voting_system: match voting_system {
                    Some(tag) => parse_voting_system(Some(tag))?,
                    None => current.voting_system,
                },
                auto_reveal: auto_reveal.unwrap_or(current.auto_reveal),
            });
        }
        self.rooms.update(&room)?;
        Ok(room)
    }

    /// Current snapshot; vote values only once revealed.
    pub fn get_room_state(&self, room_id: &str) -> Result<RoomStateView> {
        let room = hydrate(self.rooms.as_ref(), self.live.as_ref(), room_id)?;
        let state = self.live.get_state(room_id)?;
        let average = state
            .is_revealed
            .then(|| revealed_average(&state, room.voting_system))
            .flatten();
        Ok(room_state_view(&room, &state, average))
    }

    /// Replace the free-text description of what is being estimated.
    pub fn update_task_description(&self, room_id: &str, description: &str) -> Result<()> {
        let _ = hydrate(self.rooms.as_ref(), self.live.as_ref(), room_id)?;
        self.live.update_task_description(room_id, description.trim())
    }

    /// Point the room at one of its tasks; an empty ID clears the pointer.
    pub fn set_active_task(&self, room_id: &str, task_id: &str) -> Result<()> {
        let _ = hydrate(self.rooms.as_ref(), self.live.as_ref(), room_id)?;
        if !task_id.is_empty() {
            let task = self.tasks.get_by_id(task_id)?;
            if task.room_id != room_id {
                return Err(EstimoError::TaskNotFound(task_id.to_owned()));
            }
        }
        self.live.set_active_task(room_id, task_id)
    }

    /// Task currently under estimation.
    pub fn get_active_task(&self, room_id: &str) -> Result<Option<String>> {
        let _ = hydrate(self.rooms.as_ref(), self.live.as_ref(), room_id)?;
        self.live.active_task(room_id)
    }

    /// Live-store counters.
    pub fn stats(&self) -> StoreStats {
        self.live.stats()
    }
}
