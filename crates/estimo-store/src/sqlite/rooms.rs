//! Room repository over SQLite.

use chrono::{DateTime, Utc};
use estimo_core::{EstimoError, Result, Room, RoomRepository, VotingSystem};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, params};

use super::connection::{ConnectionPool, PooledConnection};
use super::{is_constraint_violation, storage_err};

/// Rooms table. Rows are never deleted.
#[derive(Clone)]
pub struct SqliteRoomRepository {
    pool: ConnectionPool,
}

impl SqliteRoomRepository {
    /// Wrap a migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection> {
        self.pool.get().map_err(storage_err)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Room> {
        let tag: String = row.get(2)?;
        let voting_system = VotingSystem::parse(&tag)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
        Ok(Room {
            id: row.get(0)?,
            name: row.get(1)?,
            voting_system,
            auto_reveal: row.get(3)?,
            created_at: parse_timestamp(row, 4)?,
            updated_at: parse_timestamp(row, 5)?,
        })
    }
}

fn parse_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl RoomRepository for SqliteRoomRepository {
    fn create(&self, room: &Room) -> Result<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO rooms (id, name, voting_system, auto_reveal, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                room.id,
                room.name,
                room.voting_system.as_str(),
                room.auto_reveal,
                room.created_at.to_rfc3339(),
                room.updated_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => {
                Err(EstimoError::RoomAlreadyExists(room.id.clone()))
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    fn get_by_id(&self, id: &str) -> Result<Room> {
        self.conn()?
            .query_row(
                "SELECT id, name, voting_system, auto_reveal, created_at, updated_at
                 FROM rooms WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()
            .map_err(storage_err)?
            .ok_or_else(|| EstimoError::RoomNotFound(id.to_owned()))
    }

    fn update(&self, room: &Room) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE rooms SET name = ?2, voting_system = ?3, auto_reveal = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    room.id,
                    room.name,
                    room.voting_system.as_str(),
                    room.auto_reveal,
                    room.updated_at.to_rfc3339(),
                ],
            )
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(EstimoError::RoomNotFound(room.id.clone()));
        }
        Ok(())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        self.conn()?
            .query_row("SELECT 1 FROM rooms WHERE id = ?1", params![id], |_| Ok(()))
            .optional()
            .map(|found| found.is_some())
            .map_err(storage_err)
    }
}
