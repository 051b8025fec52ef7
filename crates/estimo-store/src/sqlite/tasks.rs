//! Task repository over SQLite.
//!
//! Position rewrites (`delete` compaction, `reorder`) run inside one
//! transaction so readers never see a gap or a duplicate.

use estimo_core::{EstimoError, Result, Task, TaskRepository};
use rusqlite::{OptionalExtension, params};

use super::connection::{ConnectionPool, PooledConnection};
use super::{is_constraint_violation, storage_err};

const COLUMNS: &str = "id, room_id, headline, description, tracker_link, estimation, position";

/// Tasks table.
#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: ConnectionPool,
}

impl SqliteTaskRepository {
    /// Wrap a migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection> {
        self.pool.get().map_err(storage_err)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
        Ok(Task {
            id: row.get(0)?,
            room_id: row.get(1)?,
            headline: row.get(2)?,
            description: row.get(3)?,
            tracker_link: row.get(4)?,
            estimation: row.get(5)?,
            position: row.get(6)?,
        })
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn create(&self, task: &Task) -> Result<()> {
        let result = self.conn()?.execute(
            &format!("INSERT INTO tasks ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                task.id,
                task.room_id,
                task.headline,
                task.description,
                task.tracker_link,
                task.estimation,
                task.position,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            // Dangling room reference
            Err(e) if is_constraint_violation(&e) => {
                Err(EstimoError::RoomNotFound(task.room_id.clone()))
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    fn get_by_id(&self, id: &str) -> Result<Task> {
        self.conn()?
            .query_row(
                &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                Self::map_row,
            )
            .optional()
            .map_err(storage_err)?
            .ok_or_else(|| EstimoError::TaskNotFound(id.to_owned()))
    }

    fn list_by_room(&self, room_id: &str) -> Result<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM tasks WHERE room_id = ?1 ORDER BY position ASC"
            ))
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![room_id], Self::map_row)
            .map_err(storage_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err)
    }

    fn update(&self, task: &Task) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE tasks SET headline = ?2, description = ?3, tracker_link = ?4, estimation = ?5
                 WHERE id = ?1",
                params![
                    task.id,
                    task.headline,
                    task.description,
                    task.tracker_link,
                    task.estimation,
                ],
            )
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(EstimoError::TaskNotFound(task.id.clone()));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage_err)?;
        let (room_id, position): (String, u32) = tx
            .query_row(
                "SELECT room_id, position FROM tasks WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(storage_err)?
            .ok_or_else(|| EstimoError::TaskNotFound(id.to_owned()))?;

        let _ = tx
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .map_err(storage_err)?;
        let _ = tx
            .execute(
                "UPDATE tasks SET position = position - 1 WHERE room_id = ?1 AND position > ?2",
                params![room_id, position],
            )
            .map_err(storage_err)?;
        tx.commit().map_err(storage_err)
    }

    fn reorder(&self, room_id: &str, ordered_ids: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage_err)?;
        {
            let mut stmt = tx
                .prepare("UPDATE tasks SET position = ?1 WHERE id = ?2 AND room_id = ?3")
                .map_err(storage_err)?;
            for (index, id) in ordered_ids.iter().enumerate() {
                let position =
                    u32::try_from(index + 1).map_err(|_| EstimoError::invalid("too many tasks"))?;
                let changed = stmt
                    .execute(params![position, id, room_id])
                    .map_err(storage_err)?;
                if changed == 0 {
                    // Dropping the transaction rolls back the earlier rewrites
                    return Err(EstimoError::TaskNotFound(id.clone()));
                }
            }
        }
        tx.commit().map_err(storage_err)
    }

    fn next_unestimated(&self, room_id: &str) -> Result<Option<Task>> {
        self.conn()?
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM tasks
                     WHERE room_id = ?1 AND (estimation IS NULL OR estimation = '' OR estimation = '?')
                     ORDER BY position ASC LIMIT 1"
                ),
                params![room_id],
                Self::map_row,
            )
            .optional()
            .map_err(storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::connection::{ConnectionConfig, open_pool};
    use crate::sqlite::rooms::SqliteRoomRepository;
    use assert_matches::assert_matches;
    use estimo_core::{Room, RoomRepository, RoomSettings};

    fn setup() -> (SqliteTaskRepository, String) {
        let pool = open_pool(":memory:", &ConnectionConfig::default()).unwrap();
        let room = Room::new("Sprint", RoomSettings::default()).unwrap();
        SqliteRoomRepository::new(pool.clone()).create(&room).unwrap();
        (SqliteTaskRepository::new(pool), room.id)
    }

    fn seed(repo: &SqliteTaskRepository, room_id: &str, headlines: &[&str]) -> Vec<Task> {
        headlines
            .iter()
            .zip(1..)
            .map(|(h, pos)| {
                let task = Task::new(room_id, h, pos).unwrap();
                repo.create(&task).unwrap();
                task
            })
            .collect()
    }

    fn order(repo: &SqliteTaskRepository, room_id: &str) -> Vec<(String, u32)> {
        repo.list_by_room(room_id)
            .unwrap()
            .into_iter()
            .map(|t| (t.headline, t.position))
            .collect()
    }

    #[test]
    fn round_trips_optional_fields() {
        let (repo, room_id) = setup();
        let mut task = Task::new(&room_id, "Login", 1).unwrap();
        task.update_description("OAuth only");
        task.update_tracker_link("https://tracker/PROJ-7");
        repo.create(&task).unwrap();
        assert_eq!(repo.get_by_id(&task.id).unwrap(), task);
    }

    #[test]
    fn create_for_unknown_room_fails() {
        let (repo, _) = setup();
        let task = Task::new("nope", "h", 1).unwrap();
        assert_matches!(repo.create(&task), Err(EstimoError::RoomNotFound(_)));
    }

    #[test]
    fn delete_compacts_following_positions() {
        let (repo, room_id) = setup();
        let tasks = seed(&repo, &room_id, &["a", "b", "c", "d"]);
        repo.delete(&tasks[1].id).unwrap();
        assert_eq!(
            order(&repo, &room_id),
            [("a".to_owned(), 1), ("c".to_owned(), 2), ("d".to_owned(), 3)]
        );
        assert_matches!(repo.delete(&tasks[1].id), Err(EstimoError::TaskNotFound(_)));
    }

    #[test]
    fn reorder_is_atomic() {
        let (repo, room_id) = setup();
        let tasks = seed(&repo, &room_id, &["a", "b", "c"]);

        let bad = vec![tasks[2].id.clone(), "missing".to_owned(), tasks[0].id.clone()];
        assert_matches!(repo.reorder(&room_id, &bad), Err(EstimoError::TaskNotFound(_)));
        assert_eq!(
            order(&repo, &room_id),
            [("a".to_owned(), 1), ("b".to_owned(), 2), ("c".to_owned(), 3)]
        );

        let good = vec![tasks[2].id.clone(), tasks[0].id.clone(), tasks[1].id.clone()];
        repo.reorder(&room_id, &good).unwrap();
        assert_eq!(
            order(&repo, &room_id),
            [("c".to_owned(), 1), ("a".to_owned(), 2), ("b".to_owned(), 3)]
        );
    }

    #[test]
    fn next_unestimated_by_position() {
        let (repo, room_id) = setup();
        let mut tasks = seed(&repo, &room_id, &["a", "b", "c"]);
        tasks[0].set_estimation("3");
        repo.update(&tasks[0]).unwrap();
        tasks[1].set_estimation("?");
        repo.update(&tasks[1]).unwrap();
        assert_eq!(repo.next_unestimated(&room_id).unwrap().unwrap().headline, "b");

        for task in &mut tasks[1..] {
            task.set_estimation("5");
            repo.update(task).unwrap();
        }
        assert!(repo.next_unestimated(&room_id).unwrap().is_none());
    }

    #[test]
    fn update_missing_task() {
        let (repo, room_id) = setup();
        let task = Task::new(&room_id, "never stored", 1).unwrap();
        assert_matches!(repo.update(&task), Err(EstimoError::TaskNotFound(_)));
    }
}
