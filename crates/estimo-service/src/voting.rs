//! Vote, reveal and clear.

use std::sync::Arc;

use estimo_core::vote::{determine_estimation, validate_vote};
use estimo_core::{LiveRoomStore, Result, RoomRepository};
use tracing::debug;

use crate::rooms::revealed_average;
use crate::views::{RevealOutcome, vote_views};
use crate::{hydrate, require};

/// Voting service.
#[derive(Clone)]
pub struct VotingService {
    rooms: Arc<dyn RoomRepository>,
    live: Arc<dyn LiveRoomStore>,
}

impl VotingService {
    /// Create the service.
    pub fn new(rooms: Arc<dyn RoomRepository>, live: Arc<dyn LiveRoomStore>) -> Self {
        Self { rooms, live }
    }

    /// Record a vote after checking it against the room's card deck.
    pub fn submit_vote(&self, room_id: &str, user_id: &str, value: &str) -> Result<()> {
        require(user_id, "user id")?;
        let room = hydrate(self.rooms.as_ref(), self.live.as_ref(), room_id)?;
        validate_vote(value, room.voting_system)?;
        self.live.submit_vote(room_id, user_id, value)
    }

    /// Reveal the round. Calling it again recomputes the same outcome.
    pub fn reveal_votes(&self, room_id: &str) -> Result<RevealOutcome> {
        let room = hydrate(self.rooms.as_ref(), self.live.as_ref(), room_id)?;
        self.live.reveal_votes(room_id)?;
        let state = self.live.get_state(room_id)?;
        let outcome = RevealOutcome {
            votes: vote_views(&state),
            average: revealed_average(&state, room.voting_system),
        };
        debug!(room_id, votes = outcome.votes.len(), average = ?outcome.average, "votes revealed");
        Ok(outcome)
    }

    /// Start a new round.
    pub fn clear_votes(&self, room_id: &str) -> Result<()> {
        let _ = hydrate(self.rooms.as_ref(), self.live.as_ref(), room_id)?;
        self.live.clear_votes(room_id)
    }

    /// Estimation label the current round would record, if it is revealed
    /// and holds at least one vote.
    pub fn pending_estimation(&self, room_id: &str) -> Result<Option<String>> {
        let room = hydrate(self.rooms.as_ref(), self.live.as_ref(), room_id)?;
        let state = self.live.get_state(room_id)?;
        if !state.is_revealed || state.votes.is_empty() {
            return Ok(None);
        }
        let average = revealed_average(&state, room.voting_system);
        Ok(Some(determine_estimation(
            &state.votes,
            average,
            room.voting_system,
        )))
    }
}
