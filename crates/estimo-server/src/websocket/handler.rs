//! Session protocol: join, per-event dispatch, leave.
//!
//! Failures are reported to the originating connection only. Snapshots are
//! re-read after each mutation, inside the same operation.

use std::sync::Arc;

use estimo_core::{EstimoError, JoinPolicy, Result, User};
use estimo_service::{AppServices, TaskUpdate};
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::hub::Hub;
use super::protocol::{ClientEvent, ServerEvent, codes};

/// Everything one connection needs to serve its client.
#[derive(Clone)]
pub struct SessionContext {
    services: AppServices,
    hub: Hub,
    conn: Arc<ClientConnection>,
}

impl SessionContext {
    /// Bind a connection to the services and hub.
    pub fn new(services: AppServices, hub: Hub, conn: Arc<ClientConnection>) -> Self {
        Self {
            services,
            hub,
            conn,
        }
    }

    /// The connection this context serves.
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.conn
    }

    fn room_id(&self) -> &str {
        &self.conn.room_id
    }

    fn user_id(&self) -> &str {
        &self.conn.user_id
    }

    fn send_error(&self, code: &'static str, message: impl Into<String>) {
        let _ = self.conn.send_event(&ServerEvent::error(code, message));
    }

    async fn broadcast(&self, event: &ServerEvent) {
        self.hub.broadcast(self.room_id(), event, None).await;
    }

    async fn broadcast_room_state(&self) -> Result<bool> {
        let state = self.services.rooms.get_room_state(self.room_id())?;
        let revealed = state.is_revealed;
        self.broadcast(&ServerEvent::RoomState(state)).await;
        Ok(revealed)
    }

    /// Enter the room.
    ///
    /// Joins with reconnect semantics, registers with the hub, pushes the
    /// room snapshot and task list straight onto this connection's queue and
    /// announces the user to everyone else. On failure the client gets a
    /// `JOIN_FAILED` error and nothing stays registered.
    #[instrument(skip_all, fields(room_id = %self.conn.room_id, user_id = %self.conn.user_id))]
    pub async fn join(&self, nickname: &str) -> Result<User> {
        let joined = match self.services.users.join_room(
            self.room_id(),
            self.user_id(),
            nickname,
            JoinPolicy::Reconnect,
        ) {
            Ok(user) => self.welcome(user).await,
            Err(e) => Err(e),
        };
        match joined {
            Ok(user) => {
                info!(conn_id = %self.conn.id, voted = user.is_voted, "user joined");
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "join failed");
                self.send_error(codes::JOIN_FAILED, format!("failed to join room: {e}"));
                Err(e)
            }
        }
    }

    async fn welcome(&self, user: User) -> Result<User> {
        self.hub.register(self.conn.clone()).await;
        let snapshot = self
            .services
            .rooms
            .get_room_state(self.room_id())
            .and_then(|state| {
                let tasks = self.services.tasks.list_tasks(self.room_id())?;
                Ok((state, tasks))
            });
        let (state, tasks) = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.hub.unregister(self.conn.clone()).await;
                self.release_user().await;
                return Err(e);
            }
        };
        let _ = self.conn.send_event(&ServerEvent::RoomState(state));
        let _ = self.conn.send_event(&ServerEvent::TaskListSync { tasks });
        self.hub
            .broadcast(
                self.room_id(),
                &ServerEvent::UserJoined {
                    user_id: user.id.clone(),
                    nickname: user.name.clone(),
                },
                Some(self.conn.id.as_str()),
            )
            .await;
        Ok(user)
    }

    /// Handle one inbound text frame.
    #[instrument(skip_all, fields(conn_id = %self.conn.id, event_type))]
    pub async fn handle_text(&self, text: &str) {
        let event = match ClientEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "rejected message");
                self.send_error(e.code(), e.to_string());
                return;
            }
        };
        let _ = tracing::Span::current().record("event_type", event.name());
        let (name, code) = (event.name(), event.error_code());
        debug!(event_type = name, "dispatching");
        if let Err(e) = self.dispatch(event).await {
            warn!(event_type = name, error = %e, "event failed");
            self.send_error(code, e.to_string());
        }
    }

    async fn dispatch(&self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Vote(p) => self.on_vote(&p.value).await,
            ClientEvent::Reveal => self.on_reveal().await,
            ClientEvent::Clear => self.on_clear().await,
            ClientEvent::UpdateNickname(p) => self.on_update_nickname(&p.nickname).await,
            ClientEvent::SetTask(p) => {
                self.services
                    .rooms
                    .update_task_description(self.room_id(), &p.description)?;
                let _ = self.broadcast_room_state().await?;
                Ok(())
            }
            ClientEvent::CreateTask(p) => {
                let task = self.services.tasks.create_task(
                    self.room_id(),
                    &p.headline,
                    p.description.as_deref(),
                    p.tracker_link.as_deref(),
                )?;
                self.broadcast(&ServerEvent::TaskCreated(task)).await;
                Ok(())
            }
            ClientEvent::UpdateTask(p) => {
                let update = TaskUpdate {
                    headline: p.headline,
                    description: p.description,
                    tracker_link: p.tracker_link,
                };
                let task = self
                    .services
                    .tasks
                    .update_task(self.room_id(), &p.task_id, &update)?;
                self.broadcast(&ServerEvent::TaskUpdated(task)).await;
                Ok(())
            }
            ClientEvent::DeleteTask(p) => self.on_delete_task(p.task_id).await,
            ClientEvent::ReorderTasks(p) => {
                self.services
                    .tasks
                    .reorder_tasks(self.room_id(), &p.task_ids)?;
                self.broadcast(&ServerEvent::TasksReordered {
                    task_ids: p.task_ids,
                })
                .await;
                Ok(())
            }
            ClientEvent::SetActiveTask(p) => {
                self.services
                    .rooms
                    .set_active_task(self.room_id(), &p.task_id)?;
                self.broadcast(&ServerEvent::ActiveTaskSet { task_id: p.task_id })
                    .await;
                Ok(())
            }
        }
    }

    async fn on_vote(&self, value: &str) -> Result<()> {
        self.services
            .voting
            .submit_vote(self.room_id(), self.user_id(), value)?;
        self.broadcast(&ServerEvent::VoteSubmitted {
            user_id: self.user_id().to_owned(),
            has_voted: true,
        })
        .await;
        if self.broadcast_room_state().await? {
            let outcome = self.services.voting.reveal_votes(self.room_id())?;
            self.broadcast(&ServerEvent::VotesRevealed(outcome)).await;
        }
        Ok(())
    }

    async fn on_reveal(&self) -> Result<()> {
        let outcome = self.services.voting.reveal_votes(self.room_id())?;
        self.broadcast(&ServerEvent::VotesRevealed(outcome)).await;
        Ok(())
    }

    async fn on_clear(&self) -> Result<()> {
        let room_id = self.room_id();
        if let Some(estimation) = self.services.voting.pending_estimation(room_id)? {
            let active = self.services.rooms.get_active_task(room_id)?;
            match self
                .services
                .tasks
                .save_estimation(room_id, active.as_deref(), &estimation)
            {
                Ok(Some(task)) => info!(room_id, task_id = %task.id, estimation = %estimation, "estimation recorded"),
                Ok(None) => debug!(room_id, "no task to record the estimation on"),
                Err(e) => warn!(room_id, error = %e, "failed to record estimation"),
            }
        }

        self.services.voting.clear_votes(room_id)?;

        let next = self.services.tasks.next_unestimated_task(room_id)?;
        if let Some(next) = &next {
            self.services.rooms.set_active_task(room_id, &next.id)?;
        }
        let state = self.services.rooms.get_room_state(room_id)?;
        let tasks = self.services.tasks.list_tasks(room_id)?;

        self.broadcast(&ServerEvent::VotesCleared {}).await;
        self.broadcast(&ServerEvent::RoomState(state)).await;
        self.broadcast(&ServerEvent::TaskListSync { tasks }).await;
        if let Some(next) = next {
            self.broadcast(&ServerEvent::ActiveTaskSet { task_id: next.id })
                .await;
        }
        Ok(())
    }

    async fn on_update_nickname(&self, nickname: &str) -> Result<()> {
        let user = self
            .services
            .users
            .update_user_name(self.room_id(), self.user_id(), nickname)?;
        self.broadcast(&ServerEvent::UserUpdated {
            user_id: user.id,
            nickname: user.name,
        })
        .await;
        Ok(())
    }

    async fn on_delete_task(&self, task_id: String) -> Result<()> {
        let room_id = self.room_id();
        self.services.tasks.delete_task(room_id, &task_id)?;
        let was_active = self.services.rooms.get_active_task(room_id)?.as_deref() == Some(task_id.as_str());
        if was_active {
            self.services.rooms.set_active_task(room_id, "")?;
        }
        let tasks = self.services.tasks.list_tasks(room_id)?;
        self.broadcast(&ServerEvent::TaskDeleted { task_id }).await;
        self.broadcast(&ServerEvent::TaskListSync { tasks }).await;
        if was_active {
            let _ = self.broadcast_room_state().await?;
        }
        Ok(())
    }

    /// Leave the room.
    ///
    /// Unregisters this handle, then releases this session's hold on the
    /// user. The departure is announced only when that was the last hold.
    #[instrument(skip_all, fields(room_id = %self.conn.room_id, user_id = %self.conn.user_id))]
    pub async fn leave(&self) {
        self.hub.unregister(self.conn.clone()).await;
        if self.release_user().await {
            self.broadcast(&ServerEvent::UserLeft {
                user_id: self.user_id().to_owned(),
            })
            .await;
            info!(conn_id = %self.conn.id, "user left");
        }
    }

    /// Release this session's hold; the store removes the user with the last one.
    async fn release_user(&self) -> bool {
        match self.services.users.release_session(self.room_id(), self.user_id()) {
            Ok(true) => true,
            Ok(false) => {
                debug!(conn_id = %self.conn.id, "another session holds this user, keeping membership");
                false
            }
            Err(e @ (EstimoError::UserNotFound(_) | EstimoError::RoomNotFound(_))) => {
                debug!(error = %e, "user already gone");
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to remove user");
                false
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
