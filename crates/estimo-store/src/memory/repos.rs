//! In-memory durable repositories.
//!
//! The default backend. Rooms and tasks live as long as the process does;
//! the live store re-hydrates from these exactly as it would from SQLite.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use estimo_core::{EstimoError, Result, Room, RoomRepository, Task, TaskRepository};
use parking_lot::RwLock;

/// Rooms keyed by ID.
#[derive(Default)]
pub struct InMemoryRoomRepository {
    rooms: DashMap<String, Room>,
}

impl InMemoryRoomRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomRepository for InMemoryRoomRepository {
    fn create(&self, room: &Room) -> Result<()> {
        match self.rooms.entry(room.id.clone()) {
            Entry::Occupied(_) => Err(EstimoError::RoomAlreadyExists(room.id.clone())),
            Entry::Vacant(slot) => {
                let _ = slot.insert(room.clone());
                Ok(())
            }
        }
    }

    fn get_by_id(&self, id: &str) -> Result<Room> {
        self.rooms
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| EstimoError::RoomNotFound(id.to_owned()))
    }

    fn update(&self, room: &Room) -> Result<()> {
        let mut stored = self
            .rooms
            .get_mut(&room.id)
            .ok_or_else(|| EstimoError::RoomNotFound(room.id.clone()))?;
        *stored = room.clone();
        Ok(())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.rooms.contains_key(id))
    }
}

/// Tasks keyed by ID. One lock covers the table so position rewrites are atomic.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_position(tasks: &HashMap<String, Task>, room_id: &str) -> Vec<Task> {
    let mut list: Vec<Task> = tasks
        .values()
        .filter(|t| t.room_id == room_id)
        .cloned()
        .collect();
    list.sort_by_key(|t| t.position);
    list
}

impl TaskRepository for InMemoryTaskRepository {
    fn create(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.id) {
            return Err(EstimoError::invalid(format!("task {} already exists", task.id)));
        }
        let _ = tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Task> {
        self.tasks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EstimoError::TaskNotFound(id.to_owned()))
    }

    fn list_by_room(&self, room_id: &str) -> Result<Vec<Task>> {
        Ok(sorted_by_position(&self.tasks.read(), room_id))
    }

    fn update(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write();
        let stored = tasks
            .get_mut(&task.id)
            .ok_or_else(|| EstimoError::TaskNotFound(task.id.clone()))?;
        stored.headline.clone_from(&task.headline);
        stored.description.clone_from(&task.description);
        stored.tracker_link.clone_from(&task.tracker_link);
        stored.estimation.clone_from(&task.estimation);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut tasks = self.tasks.write();
        let removed = tasks
            .remove(id)
            .ok_or_else(|| EstimoError::TaskNotFound(id.to_owned()))?;
        for task in tasks.values_mut() {
            if task.room_id == removed.room_id && task.position > removed.position {
                task.position -= 1;
            }
        }
        Ok(())
    }

    fn reorder(&self, room_id: &str, ordered_ids: &[String]) -> Result<()> {
        let mut tasks = self.tasks.write();
        let owned: HashSet<&str> = tasks
            .values()
            .filter(|t| t.room_id == room_id)
            .map(|t| t.id.as_str())
            .collect();
        if let Some(stray) = ordered_ids.iter().find(|id| !owned.contains(id.as_str())) {
            return Err(EstimoError::TaskNotFound(stray.clone()));
        }
        for (index, id) in ordered_ids.iter().enumerate() {
            if let Some(task) = tasks.get_mut(id) {
                task.position = u32::try_from(index + 1)
                    .map_err(|_| EstimoError::invalid("too many tasks"))?;
            }
        }
        Ok(())
    }

    fn next_unestimated(&self, room_id: &str) -> Result<Option<Task>> {
        Ok(sorted_by_position(&self.tasks.read(), room_id)
            .into_iter()
            .find(|t| !t.is_estimated()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
