//! Durable room identity and settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EstimoError, Result};
use crate::vote::VotingSystem;

/// Maximum room name length, in characters, after trimming.
pub const MAX_ROOM_NAME_LEN: usize = 255;

/// Length of generated room IDs.
pub const ROOM_ID_LEN: usize = 8;

/// Mutable room settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    /// Card deck used for votes in this room.
    pub voting_system: VotingSystem,
    /// Reveal automatically once everyone voted.
    pub auto_reveal: bool,
}

/// A room as stored by the durable repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Short opaque identifier.
    pub id: String,
    /// Display name (1..=255 chars, trimmed).
    pub name: String,
    /// Card deck.
    pub voting_system: VotingSystem,
    /// Auto-reveal flag.
    pub auto_reveal: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last name/settings change.
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// Create a room with a freshly generated ID.
    pub fn new(name: &str, settings: RoomSettings) -> Result<Self> {
        let name = validate_room_name(name)?;
        let now = Utc::now();
        Ok(Self {
            id: generate_room_id(),
            name,
            voting_system: settings.voting_system,
            auto_reveal: settings.auto_reveal,
            created_at: now,
            updated_at: now,
        })
    }

    /// Current settings.
    pub fn settings(&self) -> RoomSettings {
        RoomSettings {
            voting_system: self.voting_system,
            auto_reveal: self.auto_reveal,
        }
    }

    /// Rename the room.
    pub fn update_name(&mut self, name: &str) -> Result<()> {
        self.name = validate_room_name(name)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replace the settings.
    pub fn update_settings(&mut self, settings: RoomSettings) {
        self.voting_system = settings.voting_system;
        self.auto_reveal = settings.auto_reveal;
        self.updated_at = Utc::now();
    }
}

/// Trim and length-check a room name.
pub fn validate_room_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EstimoError::invalid("room name cannot be empty"));
    }
    if trimmed.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(EstimoError::invalid(format!(
            "room name must be between 1 and {MAX_ROOM_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_owned())
}

/// Eight lowercase hex characters from a random UUID.
pub fn generate_room_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ROOM_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn new_room_trims_name() {
        let room = Room::new("  Sprint 42  ", RoomSettings::default()).unwrap();
        assert_eq!(room.name, "Sprint 42");
        assert_eq!(room.id.len(), ROOM_ID_LEN);
        assert_eq!(room.voting_system, VotingSystem::DbsFibo);
        assert_eq!(room.created_at, room.updated_at);
    }

    #[test]
    fn empty_name_rejected() {
        assert_matches!(
            Room::new("   ", RoomSettings::default()),
            Err(EstimoError::InvalidInput(msg)) if msg.contains("empty")
        );
    }

    #[test]
    fn name_length_boundary() {
        let ok = "x".repeat(MAX_ROOM_NAME_LEN);
        assert!(Room::new(&ok, RoomSettings::default()).is_ok());
        let long = "x".repeat(MAX_ROOM_NAME_LEN + 1);
        assert_matches!(
            Room::new(&long, RoomSettings::default()),
            Err(EstimoError::InvalidInput(_))
        );
    }

    #[test]
    fn ids_are_hex_and_distinct() {
        let a = generate_room_id();
        let b = generate_room_id();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn update_name_bumps_timestamp() {
        let mut room = Room::new("Old", RoomSettings::default()).unwrap();
        let before = room.updated_at;
        room.update_name("New").unwrap();
        assert_eq!(room.name, "New");
        assert!(room.updated_at >= before);
    }

    #[test]
    fn update_name_keeps_old_on_error() {
        let mut room = Room::new("Keep", RoomSettings::default()).unwrap();
        assert!(room.update_name("").is_err());
        assert_eq!(room.name, "Keep");
    }

    #[test]
    fn settings_roundtrip() {
        let mut room = Room::new("R", RoomSettings::default()).unwrap();
        let settings = RoomSettings {
            voting_system: VotingSystem::Fibonacci,
            auto_reveal: true,
        };
        room.update_settings(settings);
        assert_eq!(room.settings(), settings);
    }

    #[test]
    fn serializes_camel_case() {
        let room = Room::new("R", RoomSettings::default()).unwrap();
        let json = serde_json::to_value(&room).unwrap();
        assert_eq!(json["votingSystem"], "dbs_fibo");
        assert_eq!(json["autoReveal"], false);
        assert!(json["createdAt"].is_string());
    }
}
