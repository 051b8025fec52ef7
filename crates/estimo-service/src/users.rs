//! Join, leave and rename.

use std::sync::Arc;

use estimo_core::{JoinPolicy, LiveRoomStore, Result, RoomRepository, User};
use tracing::debug;

use crate::{hydrate, require};

/// User service.
#[derive(Clone)]
pub struct UserService {
    rooms: Arc<dyn RoomRepository>,
    live: Arc<dyn LiveRoomStore>,
}

impl UserService {
    /// Create the service.
    pub fn new(rooms: Arc<dyn RoomRepository>, live: Arc<dyn LiveRoomStore>) -> Self {
        Self { rooms, live }
    }

    /// Put a user into a room under `policy`.
    ///
    /// Returns the stored record, whose `is_voted` reflects any vote the
    /// room still holds for this ID.
    pub fn join_room(
        &self,
        room_id: &str,
        user_id: &str,
        name: &str,
        policy: JoinPolicy,
    ) -> Result<User> {
        require(user_id, "user id")?;
        let user = User::new(user_id, name)?;
        let _ = hydrate(self.rooms.as_ref(), self.live.as_ref(), room_id)?;
        self.live.add_user(room_id, user, policy)?;
        debug!(room_id, user_id, ?policy, "user joined");
        self.live.get_user(room_id, user_id)
    }

    /// Remove a user and their vote.
    pub fn leave_room(&self, room_id: &str, user_id: &str) -> Result<()> {
        require(room_id, "room id")?;
        require(user_id, "user id")?;
        self.live.remove_user(room_id, user_id)?;
        debug!(room_id, user_id, "user left");
        Ok(())
    }

    /// Release one socket session's hold on a user.
    ///
    /// Returns `true` when this was the last hold and the user (with their
    /// vote) has been removed.
    pub fn release_session(&self, room_id: &str, user_id: &str) -> Result<bool> {
        require(room_id, "room id")?;
        require(user_id, "user id")?;
        let removed = self.live.release_session(room_id, user_id)?;
        debug!(room_id, user_id, removed, "session released");
        Ok(removed)
    }

    /// Rename a resident user.
    pub fn update_user_name(&self, room_id: &str, user_id: &str, name: &str) -> Result<User> {
        require(room_id, "room id")?;
        require(user_id, "user id")?;
        let mut user = self.live.get_user(room_id, user_id)?;
        user.rename(name)?;
        self.live.update_user(room_id, user.clone())?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;
    use assert_matches::assert_matches;
    use estimo_core::EstimoError;

    #[test]
    fn join_requires_known_room_and_ids() {
        let fx = fixture();
        let users = &fx.services.users;
        assert_matches!(
            users.join_room("nope", "u1", "A", JoinPolicy::Strict),
            Err(EstimoError::RoomNotFound(_))
        );
        let room = fx.services.rooms.create_room("R", None, false).unwrap();
        assert_matches!(
            users.join_room(&room.id, "", "A", JoinPolicy::Strict),
            Err(EstimoError::InvalidInput(_))
        );
        assert_matches!(
            users.join_room(&room.id, "u1", &"x".repeat(51), JoinPolicy::Strict),
            Err(EstimoError::InvalidInput(_))
        );
        assert_eq!(fx.live.user_count(&room.id).unwrap(), 0);
    }

    #[test]
    fn strict_and_reconnect_policies() {
        let fx = fixture();
        let users = &fx.services.users;
        let room = fx.services.rooms.create_room("R", None, false).unwrap();

        let _ = users.join_room(&room.id, "u1", "Alice", JoinPolicy::Strict).unwrap();
        fx.services.voting.submit_vote(&room.id, "u1", "13").unwrap();

        assert_matches!(
            users.join_room(&room.id, "u1", "Alice", JoinPolicy::Strict),
            Err(EstimoError::UserAlreadyExists(_))
        );
        let again = users
            .join_room(&room.id, "u1", "Alice", JoinPolicy::Reconnect)
            .unwrap();
        assert!(again.is_voted);
    }

    #[test]
    fn overlapping_sessions_keep_user_until_last_release() {
        let fx = fixture();
        let users = &fx.services.users;
        let room = fx.services.rooms.create_room("R", None, false).unwrap();
        let _ = users.join_room(&room.id, "u1", "Alice", JoinPolicy::Reconnect).unwrap();
        let _ = users.join_room(&room.id, "u1", "Alice", JoinPolicy::Reconnect).unwrap();

        assert!(!users.release_session(&room.id, "u1").unwrap());
        assert_eq!(fx.live.user_count(&room.id).unwrap(), 1);
        assert!(users.release_session(&room.id, "u1").unwrap());
        assert_eq!(fx.live.user_count(&room.id).unwrap(), 0);
        assert_matches!(
            users.release_session(&room.id, ""),
            Err(EstimoError::InvalidInput(_))
        );
    }

    #[test]
    fn join_rehydrates_live_room() {
        let fx = fixture();
        let room = fx.services.rooms.create_room("R", None, false).unwrap();
        fx.live.delete_room(&room.id).unwrap();
        let _ = fx
            .services
            .users
            .join_room(&room.id, "u1", "Alice", JoinPolicy::Reconnect)
            .unwrap();
        assert_eq!(fx.live.user_count(&room.id).unwrap(), 1);
    }

    #[test]
    fn rename_and_leave() {
        let fx = fixture();
        let users = &fx.services.users;
        let room = fx.services.rooms.create_room("R", None, false).unwrap();
        let _ = users.join_room(&room.id, "u1", "Alice", JoinPolicy::Strict).unwrap();

        let renamed = users.update_user_name(&room.id, "u1", "  Alicia ").unwrap();
        assert_eq!(renamed.name, "Alicia");
        assert_matches!(
            users.update_user_name(&room.id, "u1", ""),
            Err(EstimoError::InvalidInput(_))
        );
        assert_eq!(fx.live.get_user(&room.id, "u1").unwrap().name, "Alicia");

        users.leave_room(&room.id, "u1").unwrap();
        assert_matches!(
            users.leave_room(&room.id, "u1"),
            Err(EstimoError::UserNotFound(_))
        );
        assert_matches!(
            users.update_user_name(&room.id, "u1", "Ghost"),
            Err(EstimoError::UserNotFound(_))
        );
    }
}
