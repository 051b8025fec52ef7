//! HTTP routes over the service façade, plus the `WebSocket` upgrade.
//!
//! REST mutations that change what connected clients see are echoed to the
//! room through the hub, so sockets and REST callers never disagree.

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, patch, post};
use estimo_core::{ErrorKind, EstimoError, JoinPolicy, Room, StoreStats, Task, User};
use estimo_service::{RevealOutcome, RoomStateView};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::health::{self, HealthResponse};
use crate::server::AppState;
use crate::websocket::protocol::ServerEvent;
use crate::websocket::session::run_session;

/// All routes, unbound from state.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/stats", get(stats))
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{id}", get(get_room))
        .route("/api/rooms/{id}/state", get(get_room_state))
        .route("/api/rooms/{id}/users", post(join_room))
        .route(
            "/api/rooms/{id}/users/{user_id}",
            patch(rename_user).delete(leave_room),
        )
        .route("/api/rooms/{id}/votes", post(submit_vote))
        .route("/api/rooms/{id}/reveal", post(reveal_votes))
        .route("/api/rooms/{id}/clear", post(clear_votes))
        .route("/api/rooms/{id}/tasks", get(list_tasks))
        .route("/ws/rooms/{id}", get(ws_upgrade))
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// An [`EstimoError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub EstimoError);

impl From<EstimoError> for ApiError {
    fn from(err: EstimoError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

/// Status code for an error class.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidInput | ErrorKind::InvalidVote | ErrorKind::NoVotes => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code: kind.as_str(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Bodies ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomRequest {
    name: String,
    voting_system: Option<String>,
    #[serde(default)]
    auto_reveal: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest {
    user_id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteRequest {
    user_id: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct TaskList {
    tasks: Vec<Task>,
}

/// Query string of the `WebSocket` endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    /// Stable client-chosen user ID.
    pub user_id: Option<String>,
    /// Display name.
    pub nickname: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Handlers ────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
        state.hub.room_count(),
    ))
}

async fn stats(State(state): State<AppState>) -> Json<StoreStats> {
    Json(state.services.rooms.stats())
}

async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomRequest>,
) -> ApiResult<(StatusCode, Json<Room>)> {
    let room = state.services.rooms.create_room(
        &body.name,
        body.voting_system.as_deref(),
        body.auto_reveal,
    )?;
    Ok((StatusCode::CREATED, Json(room)))
}

async fn get_room(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Room>> {
    Ok(Json(state.services.rooms.get_room(&id)?))
}

async fn get_room_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RoomStateView>> {
    Ok(Json(state.services.rooms.get_room_state(&id)?))
}

async fn join_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<JoinRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user_id = match present(body.user_id) {
        Some(user_id) => user_id,
        None => User::with_generated_id(&body.name)?.id,
    };
    let user = state
        .services
        .users
        .join_room(&id, &user_id, &body.name, JoinPolicy::Strict)?;
    state
        .hub
        .broadcast(
            &id,
            &ServerEvent::UserJoined {
                user_id: user.id.clone(),
                nickname: user.name.clone(),
            },
            None,
        )
        .await;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn leave_room(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.services.users.leave_room(&id, &user_id)?;
    state
        .hub
        .broadcast(&id, &ServerEvent::UserLeft { user_id }, None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

async fn rename_user(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(String, String)>,
    Json(body): Json<RenameRequest>,
) -> ApiResult<Json<User>> {
    let user = state
        .services
        .users
        .update_user_name(&id, &user_id, &body.name)?;
    state
        .hub
        .broadcast(
            &id,
            &ServerEvent::UserUpdated {
                user_id: user.id.clone(),
                nickname: user.name.clone(),
            },
            None,
        )
        .await;
    Ok(Json(user))
}

async fn submit_vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<VoteRequest>,
) -> ApiResult<StatusCode> {
    state
        .services
        .voting
        .submit_vote(&id, &body.user_id, &body.value)?;
    state
        .hub
        .broadcast(
            &id,
            &ServerEvent::VoteSubmitted {
                user_id: body.user_id,
                has_voted: true,
            },
            None,
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

async fn reveal_votes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RevealOutcome>> {
    let outcome = state.services.voting.reveal_votes(&id)?;
    state
        .hub
        .broadcast(&id, &ServerEvent::VotesRevealed(outcome.clone()), None)
        .await;
    Ok(Json(outcome))
}

async fn clear_votes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.services.voting.clear_votes(&id)?;
    let snapshot = state.services.rooms.get_room_state(&id)?;
    state.hub.broadcast(&id, &ServerEvent::VotesCleared {}, None).await;
    state
        .hub
        .broadcast(&id, &ServerEvent::RoomState(snapshot), None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskList>> {
    let tasks = state.services.tasks.list_tasks(&id)?;
    Ok(Json(TaskList { tasks }))
}

/// `GET /ws/rooms/{id}?userId=&nickname=`.
///
/// Both parameters are checked before the upgrade; the room itself is checked
/// by the session, which reports `JOIN_FAILED` over the socket.
async fn ws_upgrade(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<WsParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let (Some(user_id), Some(nickname)) = (present(params.user_id), present(params.nickname))
    else {
        return ApiError(EstimoError::invalid("userId and nickname are required")).into_response();
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let max = state.config.max_message_size;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| run_session(socket, room_id, user_id, nickname, state))
}
