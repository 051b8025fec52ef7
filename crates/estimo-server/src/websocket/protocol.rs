//! Wire protocol: `{ "type": ..., "payload": {...} }` in both directions.
//!
//! Inbound text is decoded in two steps so that a malformed envelope, an
//! unknown `type` and a bad payload map to distinct error codes.

use estimo_core::Task;
use estimo_service::{RevealOutcome, RoomStateView};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error codes carried by [`ServerEvent::Error`].
pub mod codes {
    /// The frame is not a JSON envelope.
    pub const INVALID_FORMAT: &str = "INVALID_FORMAT";
    /// The envelope names an event the server does not handle.
    pub const UNKNOWN_EVENT: &str = "UNKNOWN_EVENT";
    /// The payload does not match the event's shape.
    pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
    /// `vote` was rejected.
    pub const VOTE_ERROR: &str = "VOTE_ERROR";
    /// `reveal` failed.
    pub const REVEAL_ERROR: &str = "REVEAL_ERROR";
    /// `clear` failed.
    pub const CLEAR_ERROR: &str = "CLEAR_ERROR";
    /// `update_nickname` or `set_task` was rejected.
    pub const UPDATE_ERROR: &str = "UPDATE_ERROR";
    /// A task operation was rejected.
    pub const TASK_ERROR: &str = "TASK_ERROR";
    /// The initial join failed; the socket is closed afterwards.
    pub const JOIN_FAILED: &str = "JOIN_FAILED";
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    payload: Value,
}

/// `vote`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct VotePayload {
    /// Card label.
    pub value: String,
}

/// `update_nickname`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NicknamePayload {
    /// New display name.
    pub nickname: String,
}

/// `set_task`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TaskDescriptionPayload {
    /// Free text.
    pub description: String,
}

/// `create_task`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskPayload {
    /// Short title.
    pub headline: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional tracker URL.
    pub tracker_link: Option<String>,
}

/// `update_task`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskPayload {
    /// Task to edit.
    pub task_id: String,
    /// New headline.
    pub headline: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New tracker URL.
    pub tracker_link: Option<String>,
}

/// `delete_task`, `set_active_task`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIdPayload {
    /// Target task.
    pub task_id: String,
}

/// `reorder_tasks`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderTasksPayload {
    /// Every task of the room, in the new order.
    pub task_ids: Vec<String>,
}

/// A decoded client message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// Cast or change a vote.
    Vote(VotePayload),
    /// Reveal the round.
    Reveal,
    /// Clear the round, recording the estimation when revealed.
    Clear,
    /// Rename the sender.
    UpdateNickname(NicknamePayload),
    /// Replace the free-text description.
    SetTask(TaskDescriptionPayload),
    /// Append a task.
    CreateTask(CreateTaskPayload),
    /// Edit a task.
    UpdateTask(UpdateTaskPayload),
    /// Delete a task.
    DeleteTask(TaskIdPayload),
    /// Rewrite the task order.
    ReorderTasks(ReorderTasksPayload),
    /// Point the room at a task.
    SetActiveTask(TaskIdPayload),
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not a JSON envelope.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
    /// Unrecognized `type`.
    #[error("unknown event type: {0}")]
    UnknownEvent(String),
    /// Payload does not match the event.
    #[error("invalid {event} payload: {message}")]
    InvalidPayload {
        /// Event type.
        event: String,
        /// Decoder message.
        message: String,
    },
}

impl ProtocolError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat(_) => codes::INVALID_FORMAT,
            Self::UnknownEvent(_) => codes::UNKNOWN_EVENT,
            Self::InvalidPayload { .. } => codes::INVALID_PAYLOAD,
        }
    }
}

fn payload<T: DeserializeOwned>(event: &str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_owned(),
        message: e.to_string(),
    })
}

impl ClientEvent {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let Envelope {
            event_type,
            payload: body,
        } = serde_json::from_str(text).map_err(|e| ProtocolError::InvalidFormat(e.to_string()))?;
        let ty = event_type.as_str();
        Ok(match ty {
            "vote" => Self::Vote(payload(ty, body)?),
            "reveal" => Self::Reveal,
            "clear" => Self::Clear,
            "update_nickname" => Self::UpdateNickname(payload(ty, body)?),
            "set_task" => Self::SetTask(payload(ty, body)?),
            "create_task" => Self::CreateTask(payload(ty, body)?),
            "update_task" => Self::UpdateTask(payload(ty, body)?),
            "delete_task" => Self::DeleteTask(payload(ty, body)?),
            "reorder_tasks" => Self::ReorderTasks(payload(ty, body)?),
            "set_active_task" => Self::SetActiveTask(payload(ty, body)?),
            _ => return Err(ProtocolError::UnknownEvent(event_type)),
        })
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vote(_) => "vote",
            Self::Reveal => "reveal",
            Self::Clear => "clear",
            Self::UpdateNickname(_) => "update_nickname",
            Self::SetTask(_) => "set_task",
            Self::CreateTask(_) => "create_task",
            Self::UpdateTask(_) => "update_task",
            Self::DeleteTask(_) => "delete_task",
            Self::ReorderTasks(_) => "reorder_tasks",
            Self::SetActiveTask(_) => "set_active_task",
        }
    }

    /// Code reported when handling this event fails.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Vote(_) => codes::VOTE_ERROR,
            Self::Reveal => codes::REVEAL_ERROR,
            Self::Clear => codes::CLEAR_ERROR,
            Self::UpdateNickname(_) | Self::SetTask(_) => codes::UPDATE_ERROR,
            Self::CreateTask(_)
            | Self::UpdateTask(_)
            | Self::DeleteTask(_)
            | Self::ReorderTasks(_)
            | Self::SetActiveTask(_) => codes::TASK_ERROR,
        }
    }
}

/// A server message.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Full snapshot; vote values only once revealed.
    RoomState(RoomStateView),
    /// Someone joined.
    UserJoined {
        /// Joiner.
        user_id: String,
        /// Display name.
        nickname: String,
    },
    /// Someone left.
    UserLeft {
        /// Leaver.
        user_id: String,
    },
    /// Someone voted. Never carries the value.
    VoteSubmitted {
        /// Voter.
        user_id: String,
        /// Always `true`.
        has_voted: bool,
    },
    /// Every vote plus the raw mean.
    VotesRevealed(RevealOutcome),
    /// A new round started.
    VotesCleared {},
    /// Someone renamed themselves.
    UserUpdated {
        /// User.
        user_id: String,
        /// New display name.
        nickname: String,
    },
    /// A task was appended.
    TaskCreated(Task),
    /// A task was edited.
    TaskUpdated(Task),
    /// A task was deleted.
    TaskDeleted {
        /// Deleted task.
        task_id: String,
    },
    /// The task order changed.
    TasksReordered {
        /// New order.
        task_ids: Vec<String>,
    },
    /// The room points at a new task.
    ActiveTaskSet {
        /// Active task; empty when cleared.
        task_id: String,
    },
    /// Full task list.
    TaskListSync {
        /// Tasks by position.
        tasks: Vec<Task>,
    },
    /// Sent to the originating connection only.
    Error {
        /// Human-readable reason.
        message: String,
        /// One of [`codes`].
        code: &'static str,
    },
}

impl ServerEvent {
    /// Build an error event.
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code,
        }
    }

    /// Wire name, for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoomState(_) => "room_state",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::VoteSubmitted { .. } => "vote_submitted",
            Self::VotesRevealed(_) => "votes_revealed",
            Self::VotesCleared {} => "votes_cleared",
            Self::UserUpdated { .. } => "user_updated",
            Self::TaskCreated(_) => "task_created",
            Self::TaskUpdated(_) => "task_updated",
            Self::TaskDeleted { .. } => "task_deleted",
            Self::TasksReordered { .. } => "tasks_reordered",
            Self::ActiveTaskSet { .. } => "active_task_set",
            Self::TaskListSync { .. } => "task_list_sync",
            Self::Error { .. } => "error",
        }
    }
}
