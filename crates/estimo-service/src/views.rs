//! Read models handed to the HTTP and WebSocket layers.

use std::collections::HashMap;

use estimo_core::{LiveRoomState, Room, User};
use serde::Serialize;

/// One revealed vote.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteView {
    /// Voter.
    pub user_id: String,
    /// Card label.
    pub value: String,
    /// Voter's display name at reveal time; empty if the voter already left.
    pub user_name: String,
}

/// Snapshot of a live room as clients see it.
///
/// `votes` and `average` stay empty until the round is revealed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateView {
    /// Room ID.
    pub room_id: String,
    /// Room display name.
    pub room_name: String,
    /// Resident users, sorted by name then ID.
    pub users: Vec<User>,
    /// Revealed votes, sorted by user name then ID.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub votes: Vec<VoteView>,
    /// Whether the round is revealed.
    pub is_revealed: bool,
    /// Free-text description of what is being estimated.
    pub task_description: String,
    /// Task currently under estimation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_task_id: Option<String>,
    /// Raw mean of the numeric votes, once revealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

/// Result of revealing a round.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RevealOutcome {
    /// Every recorded vote.
    pub votes: Vec<VoteView>,
    /// Raw mean; `None` when no vote carried a number.
    pub average: Option<f64>,
}

pub(crate) fn sorted_users(users: &HashMap<String, User>) -> Vec<User> {
    let mut list: Vec<User> = users.values().cloned().collect();
    list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    list
}

pub(crate) fn vote_views(state: &LiveRoomState) -> Vec<VoteView> {
    let mut votes: Vec<VoteView> = state
        .votes
        .iter()
        .map(|(user_id, value)| VoteView {
            user_id: user_id.clone(),
            value: value.clone(),
            user_name: state
                .users
                .get(user_id)
                .map(|u| u.name.clone())
                .unwrap_or_default(),
        })
        .collect();
    votes.sort_by(|a, b| {
        a.user_name
            .cmp(&b.user_name)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    votes
}

pub(crate) fn room_state_view(room: &Room, state: &LiveRoomState, average: Option<f64>) -> RoomStateView {
    RoomStateView {
        room_id: state.room_id.clone(),
        room_name: room.name.clone(),
        users: sorted_users(&state.users),
        votes: if state.is_revealed {
            vote_views(state)
        } else {
            Vec::new()
        },
        is_revealed: state.is_revealed,
        task_description: state.task_description.clone(),
        active_task_id: state.active_task_id.clone(),
        average: if state.is_revealed { average } else { None },
    }
}
