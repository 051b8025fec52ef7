//! Room participants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EstimoError, Result};

/// Maximum display-name length, in characters, after trimming.
pub const MAX_USER_NAME_LEN: usize = 50;

/// A participant resident in a live room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Client-supplied, stable across reconnects.
    pub id: String,
    /// Display name (1..=50 chars, trimmed).
    pub name: String,
    /// Whether a vote is recorded for this user. Owned by the live store.
    pub is_voted: bool,
    /// True while the user is resident in the live store.
    pub is_online: bool,
}

impl User {
    /// Create a user with a caller-supplied ID.
    pub fn new(id: &str, name: &str) -> Result<Self> {
        if id.trim().is_empty() {
            return Err(EstimoError::invalid("user id is required"));
        }
        Ok(Self {
            id: id.to_owned(),
            name: validate_user_name(name)?,
            is_voted: false,
            is_online: true,
        })
    }

    /// Create a user with a generated ID.
    pub fn with_generated_id(name: &str) -> Result<Self> {
        Self::new(&Uuid::now_v7().to_string(), name)
    }

    /// Change the display name.
    pub fn rename(&mut self, name: &str) -> Result<()> {
        self.name = validate_user_name(name)?;
        Ok(())
    }
}

/// Trim and length-check a display name.
pub fn validate_user_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EstimoError::invalid("user name cannot be empty"));
    }
    if trimmed.chars().count() > MAX_USER_NAME_LEN {
        return Err(EstimoError::invalid(format!(
            "user name must be between 1 and {MAX_USER_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn new_user_defaults() {
        let user = User::new("u1", " Alice ").unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.name, "Alice");
        assert!(!user.is_voted);
        assert!(user.is_online);
    }

    #[test]
    fn empty_id_rejected() {
        assert_matches!(User::new("", "Alice"), Err(EstimoError::InvalidInput(_)));
    }

    #[test]
    fn generated_id_is_uuid() {
        let user = User::with_generated_id("Bob").unwrap();
        assert!(Uuid::parse_str(&user.id).is_ok());
    }

    #[test]
    fn name_boundaries() {
        assert!(User::new("u", &"n".repeat(MAX_USER_NAME_LEN)).is_ok());
        assert_matches!(
            User::new("u", &"n".repeat(MAX_USER_NAME_LEN + 1)),
            Err(EstimoError::InvalidInput(msg)) if msg.contains("between 1 and 50")
        );
        assert_matches!(User::new("u", "  "), Err(EstimoError::InvalidInput(_)));
    }

    #[test]
    fn multibyte_names_counted_by_char() {
        let name = "é".repeat(MAX_USER_NAME_LEN);
        assert!(User::new("u", &name).is_ok());
    }

    #[test]
    fn rename_validates() {
        let mut user = User::new("u", "Alice").unwrap();
        user.rename("  Alicia ").unwrap();
        assert_eq!(user.name, "Alicia");
        assert!(user.rename("").is_err());
        assert_eq!(user.name, "Alicia");
    }
}
