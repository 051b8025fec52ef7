//! Task list management and estimation bookkeeping.

use std::collections::HashSet;
use std::sync::Arc;

use estimo_core::{EstimoError, Result, RoomRepository, Task, TaskRepository};
use tracing::{debug, info};

use crate::require;

/// Partial task edit. Empty or absent fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    /// New headline.
    pub headline: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New tracker link.
    pub tracker_link: Option<String>,
}

fn non_empty(field: Option<&String>) -> Option<&str> {
    field.map(String::as_str).filter(|v| !v.trim().is_empty())
}

/// Task service.
#[derive(Clone)]
pub struct TaskService {
    rooms: Arc<dyn RoomRepository>,
    tasks: Arc<dyn TaskRepository>,
}

impl TaskService {
    /// Create the service.
    pub fn new(rooms: Arc<dyn RoomRepository>, tasks: Arc<dyn TaskRepository>) -> Self {
        Self { rooms, tasks }
    }

    fn ensure_room(&self, room_id: &str) -> Result<()> {
        require(room_id, "room id")?;
        if self.rooms.exists(room_id)? {
            Ok(())
        } else {
            Err(EstimoError::RoomNotFound(room_id.to_owned()))
        }
    }

    /// Load a task and check that it belongs to `room_id`.
    fn owned_task(&self, room_id: &str, task_id: &str) -> Result<Task> {
        require(task_id, "task id")?;
        let task = self.tasks.get_by_id(task_id)?;
        if task.room_id != room_id {
            return Err(EstimoError::TaskNotFound(task_id.to_owned()));
        }
        Ok(task)
    }

    /// Append a task to the end of the room's list.
    pub fn create_task(
        &self,
        room_id: &str,
        headline: &str,
        description: Option<&str>,
        tracker_link: Option<&str>,
    ) -> Result<Task> {
        self.ensure_room(room_id)?;
        let count = self.tasks.list_by_room(room_id)?.len();
        let position = u32::try_from(count + 1).map_err(|_| EstimoError::invalid("too many tasks"))?;
        let mut task = Task::new(room_id, headline, position)?;
        if let Some(description) = description {
            task.update_description(description);
        }
        if let Some(link) = tracker_link {
            task.update_tracker_link(link);
        }
        self.tasks.create(&task)?;
        debug!(room_id, task_id = %task.id, position, "task created");
        Ok(task)
    }

    /// Load a task.
    pub fn get_task(&self, task_id: &str) -> Result<Task> {
        require(task_id, "task id")?;
        self.tasks.get_by_id(task_id)
    }

    /// Tasks of a room, by position.
    pub fn list_tasks(&self, room_id: &str) -> Result<Vec<Task>> {
        self.ensure_room(room_id)?;
        self.tasks.list_by_room(room_id)
    }

    /// Apply the non-empty fields of `update`.
    pub fn update_task(&self, room_id: &str, task_id: &str, update: &TaskUpdate) -> Result<Task> {
        let mut task = self.owned_task(room_id, task_id)?;
        if let Some(headline) = non_empty(update.headline.as_ref()) {
            task.update_headline(headline)?;
        }
        if let Some(description) = non_empty(update.description.as_ref()) {
            task.update_description(description);
        }
        if let Some(link) = non_empty(update.tracker_link.as_ref()) {
            task.update_tracker_link(link);
        }
        self.tasks.update(&task)?;
        Ok(task)
    }

    /// Delete a task; later tasks move up by one.
    pub fn delete_task(&self, room_id: &str, task_id: &str) -> Result<()> {
        let _ = self.owned_task(room_id, task_id)?;
        self.tasks.delete(task_id)
    }

    /// Rewrite the order. `task_ids` must be a permutation of the room's tasks.
    pub fn reorder_tasks(&self, room_id: &str, task_ids: &[String]) -> Result<()> {
        if task_ids.is_empty() {
            return Err(EstimoError::invalid("task ids are required"));
        }
        let current = self.list_tasks(room_id)?;
        if task_ids.len() != current.len() {
            return Err(EstimoError::invalid(format!(
                "task count mismatch: expected {}, got {}",
                current.len(),
                task_ids.len()
            )));
        }
        let known: HashSet<&str> = current.iter().map(|t| t.id.as_str()).collect();
        let mut seen = HashSet::with_capacity(task_ids.len());
        for id in task_ids {
            if !known.contains(id.as_str()) {
                return Err(EstimoError::invalid(format!("task {id} is not in this room")));
            }
            if !seen.insert(id.as_str()) {
                return Err(EstimoError::invalid(format!("task {id} listed twice")));
            }
        }
        self.tasks.reorder(room_id, task_ids)
    }

    /// Lowest-positioned task without a usable estimation.
    pub fn next_unestimated_task(&self, room_id: &str) -> Result<Option<Task>> {
        self.ensure_room(room_id)?;
        self.tasks.next_unestimated(room_id)
    }

    /// Record a finished round's estimation.
    ///
    /// Targets the active task when it still exists in this room, otherwise
    /// the next unestimated task. Returns the updated task, or `None` when
    /// there was nothing to record on.
    pub fn save_estimation(
        &self,
        room_id: &str,
        active_task_id: Option<&str>,
        estimation: &str,
    ) -> Result<Option<Task>> {
        self.ensure_room(room_id)?;
        let active = match active_task_id.filter(|id| !id.is_empty()) {
            Some(id) => match self.owned_task(room_id, id) {
                Ok(task) => Some(task),
                Err(EstimoError::TaskNotFound(_)) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };
        let target = match active {
            Some(task) => Some(task),
            None => self.tasks.next_unestimated(room_id)?,
        };
        let Some(mut task) = target else {
            return Ok(None);
        };
        task.set_estimation(estimation);
        self.tasks.update(&task)?;
        info!(room_id, task_id = %task.id, estimation, "estimation saved");
        Ok(Some(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;
    use assert_matches::assert_matches;

    fn room_with_tasks(headlines: &[&str]) -> (crate::test_support::Fixture, String, Vec<Task>) {
        let fx = fixture();
        let room = fx.services.rooms.create_room("R", None, false).unwrap();
        let tasks = headlines
            .iter()
            .map(|h| fx.services.tasks.create_task(&room.id, h, None, None).unwrap())
            .collect();
        (fx, room.id, tasks)
    }

    fn ids(tasks: &[Task]) -> Vec<String> {
        tasks.iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn create_appends() {
        let (fx, room_id, tasks) = room_with_tasks(&["a", "b"]);
        assert_eq!(tasks[1].position, 2);
        let c = fx
            .services
            .tasks
            .create_task(&room_id, "c", Some(" details "), Some("https://t/1"))
            .unwrap();
        assert_eq!(c.position, 3);
        assert_eq!(c.description, "details");
        assert_eq!(c.tracker_link.as_deref(), Some("https://t/1"));
    }

    #[test]
    fn create_in_unknown_room() {
        let fx = fixture();
        assert_matches!(
            fx.services.tasks.create_task("nope", "a", None, None),
            Err(EstimoError::RoomNotFound(_))
        );
    }

    #[test]
    fn update_skips_empty_fields() {
        let (fx, room_id, tasks) = room_with_tasks(&["a"]);
        let updated = fx
            .services
            .tasks
            .update_task(
                &room_id,
                &tasks[0].id,
                &TaskUpdate {
                    headline: Some(String::new()),
                    description: Some("new details".into()),
                    tracker_link: None,
                },
            )
            .unwrap();
        assert_eq!(updated.headline, "a");
        assert_eq!(updated.description, "new details");
    }

    #[test]
    fn task_of_other_room_is_not_found() {
        let (fx, _room_id, tasks) = room_with_tasks(&["a"]);
        let other = fx.services.rooms.create_room("Other", None, false).unwrap();
        assert_matches!(
            fx.services.tasks.delete_task(&other.id, &tasks[0].id),
            Err(EstimoError::TaskNotFound(_))
        );
        assert_matches!(
            fx.services
                .tasks
                .update_task(&other.id, &tasks[0].id, &TaskUpdate::default()),
            Err(EstimoError::TaskNotFound(_))
        );
    }

    #[test]
    fn reorder_requires_permutation() {
        let (fx, room_id, tasks) = room_with_tasks(&["a", "b", "c"]);
        let svc = &fx.services.tasks;
        assert_matches!(svc.reorder_tasks(&room_id, &[]), Err(EstimoError::InvalidInput(_)));
        assert_matches!(
            svc.reorder_tasks(&room_id, &ids(&tasks[..2])),
            Err(EstimoError::InvalidInput(msg)) if msg.contains("mismatch")
        );
        let dup = vec![tasks[0].id.clone(), tasks[0].id.clone(), tasks[1].id.clone()];
        assert_matches!(svc.reorder_tasks(&room_id, &dup), Err(EstimoError::InvalidInput(_)));
        let stray = vec![tasks[0].id.clone(), tasks[1].id.clone(), "zzz".to_owned()];
        assert_matches!(svc.reorder_tasks(&room_id, &stray), Err(EstimoError::InvalidInput(_)));

        let mut reversed = ids(&tasks);
        reversed.reverse();
        svc.reorder_tasks(&room_id, &reversed).unwrap();
        assert_eq!(ids(&svc.list_tasks(&room_id).unwrap()), reversed);
    }

    #[test]
    fn delete_compacts() {
        let (fx, room_id, tasks) = room_with_tasks(&["a", "b", "c"]);
        fx.services.tasks.delete_task(&room_id, &tasks[0].id).unwrap();
        let list = fx.services.tasks.list_tasks(&room_id).unwrap();
        assert_eq!(list.iter().map(|t| t.position).collect::<Vec<_>>(), [1, 2]);
    }

    #[test]
    fn save_estimation_targets_active_then_falls_back() {
        let (fx, room_id, tasks) = room_with_tasks(&["a", "b", "c"]);
        let svc = &fx.services.tasks;

        let saved = svc
            .save_estimation(&room_id, Some(&tasks[1].id), "8")
            .unwrap()
            .unwrap();
        assert_eq!(saved.id, tasks[1].id);

        let fallback = svc.save_estimation(&room_id, None, "3").unwrap().unwrap();
        assert_eq!(fallback.id, tasks[0].id);

        let stale = svc
            .save_estimation(&room_id, Some("deleted-task"), "5")
            .unwrap()
            .unwrap();
        assert_eq!(stale.id, tasks[2].id);

        assert!(svc.next_unestimated_task(&room_id).unwrap().is_none());
        assert!(svc.save_estimation(&room_id, None, "1").unwrap().is_none());
    }
}
