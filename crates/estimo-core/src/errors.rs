//! Error taxonomy for estimo.
//!
//! [`EstimoError`] is returned by every domain, store and service operation.
//! Each variant classifies into an [`ErrorKind`], which the HTTP layer maps to
//! a status code and the session protocol maps to a wire error code.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Errors produced by estimo domain and service operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimoError {
    /// The room is unknown to the repository or not resident in the live store.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// The user is not present in the room.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A room with this ID already exists.
    #[error("room already exists: {0}")]
    RoomAlreadyExists(String),

    /// A user with this ID is already in the room (strict join only).
    #[error("user already exists: {0}")]
    UserAlreadyExists(String),

    /// A required field was empty, too long, or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The vote value is not a card of the room's voting system.
    #[error("invalid vote: {0}")]
    InvalidVote(String),

    /// The voting-system tag is not recognized.
    #[error("unknown voting system: {0}")]
    UnknownVotingSystem(String),

    /// Averaging was requested over an empty vote set.
    #[error("no votes to calculate")]
    NoVotes,

    /// The durable repository failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EstimoError {
    /// Shorthand for [`EstimoError::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoomNotFound(_) | Self::UserNotFound(_) | Self::TaskNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::RoomAlreadyExists(_) | Self::UserAlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidVote(_) | Self::UnknownVotingSystem(_) => ErrorKind::InvalidVote,
            Self::NoVotes => ErrorKind::NoVotes,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }
}

/// Coarse classification of [`EstimoError`] used at transport boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Room, user or task absent.
    NotFound,
    /// Duplicate room or user on a strict-create path.
    AlreadyExists,
    /// Empty, oversized or malformed input.
    InvalidInput,
    /// Vote value or voting system rejected.
    InvalidVote,
    /// Averaging an empty vote set.
    NoVotes,
    /// Anything the caller cannot fix.
    Internal,
}

impl ErrorKind {
    /// Wire representation (`NOT_FOUND`, `INVALID_VOTE`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidVote => "INVALID_VOTE",
            Self::NoVotes => "NO_VOTES",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convenience type alias for estimo results.
pub type Result<T> = std::result::Result<T, EstimoError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_not_found_display() {
        let err = EstimoError::RoomNotFound("abc12345".into());
        assert_eq!(err.to_string(), "room not found: abc12345");
    }

    #[test]
    fn no_votes_display() {
        assert_eq!(EstimoError::NoVotes.to_string(), "no votes to calculate");
    }

    #[test]
    fn not_found_variants_share_kind() {
        assert_eq!(EstimoError::RoomNotFound("r".into()).kind(), ErrorKind::NotFound);
        assert_eq!(EstimoError::UserNotFound("u".into()).kind(), ErrorKind::NotFound);
        assert_eq!(EstimoError::TaskNotFound("t".into()).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn vote_errors_classified_together() {
        assert_eq!(EstimoError::InvalidVote("4".into()).kind(), ErrorKind::InvalidVote);
        assert_eq!(
            EstimoError::UnknownVotingSystem("tshirt".into()).kind(),
            ErrorKind::InvalidVote
        );
    }

    #[test]
    fn storage_is_internal() {
        let err = EstimoError::Storage("disk full".into());
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.kind().to_string(), "INTERNAL");
    }

    #[test]
    fn invalid_shorthand() {
        let err = EstimoError::invalid("room id is required");
        assert_eq!(err, EstimoError::InvalidInput("room id is required".into()));
    }

    #[test]
    fn kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::AlreadyExists).unwrap();
        assert_eq!(json, "\"ALREADY_EXISTS\"");
    }
}
