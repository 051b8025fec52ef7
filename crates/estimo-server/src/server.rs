//! Server assembly: shared state, router, listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use estimo_service::AppServices;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::rest;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::hub::Hub;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Service façade.
    pub services: AppServices,
    /// Room fan-out.
    pub hub: Hub,
    /// Transport knobs.
    pub config: Arc<ServerConfig>,
    /// Root cancellation for sessions.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Process start, for uptime.
    pub start_time: Instant,
}

/// The estimo HTTP + `WebSocket` server.
pub struct EstimoServer {
    state: AppState,
}

impl EstimoServer {
    /// Build the server and start its hub loop.
    ///
    /// Must be called inside a Tokio runtime. The hub is tracked by the
    /// shutdown coordinator and stops with it.
    pub fn new(config: ServerConfig, services: AppServices) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (hub, hub_task) = Hub::spawn(shutdown.token());
        shutdown.track("hub", hub_task);
        Self {
            state: AppState {
                services,
                hub,
                config: Arc::new(config),
                shutdown,
                start_time: Instant::now(),
            },
        }
    }

    /// Routes with CORS and request tracing applied.
    pub fn router(&self) -> Router {
        rest::routes()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve until the shutdown token fires.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "http server failed");
            }
            info!("http server stopped");
        });
        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Room hub.
    pub fn hub(&self) -> &Hub {
        &self.state.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Transport configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use estimo_core::{LiveRoomStore, RoomRepository, TaskRepository};
    use estimo_store::{InMemoryRoomRepository, InMemoryTaskRepository, RoomStateStore};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn make_server() -> EstimoServer {
        let services = AppServices::new(
            Arc::new(InMemoryRoomRepository::new()) as Arc<dyn RoomRepository>,
            Arc::new(InMemoryTaskRepository::new()) as Arc<dyn TaskRepository>,
            Arc::new(RoomStateStore::default()) as Arc<dyn LiveRoomStore>,
        );
        EstimoServer::new(ServerConfig::default(), services)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn create_room(app: &Router) -> String {
        let (status, room) = call(app, Method::POST, "/api/rooms", Some(json!({"name": "Sprint"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        room["id"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.shutdown().tracked(), 1);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["rooms"], 0);
        assert!(body["uptimeSecs"].is_number());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let (status, _) = call(&app, Method::GET, "/nonexistent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn room_creation_is_logged_once() {
        let (logs, _guard) = estimo_core::logging::capture_logs();
        let app = make_server().router();
        let id = create_room(&app).await;

        let created: Vec<_> = logs
            .events()
            .into_iter()
            .filter(|e| e.level == tracing::Level::INFO && e.message == "room created")
            .collect();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].field("room_id"), Some(id.as_str()));
    }

    #[tokio::test]
    async fn room_lifecycle_over_rest() {
        let app = make_server().router();
        let id = create_room(&app).await;

        let (status, room) = call(&app, Method::GET, &format!("/api/rooms/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(room["name"], "Sprint");
        assert_eq!(room["votingSystem"], "dbs_fibo");

        let (status, user) = call(
            &app,
            Method::POST,
            &format!("/api/rooms/{id}/users"),
            Some(json!({"userId": "u1", "name": "Alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["id"], "u1");

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/api/rooms/{id}/votes"),
            Some(json!({"userId": "u1", "value": "5"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, outcome) = call(&app, Method::POST, &format!("/api/rooms/{id}/reveal"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["average"], 5.0);
        assert_eq!(outcome["votes"][0]["value"], "5");

        let (status, _) = call(&app, Method::POST, &format!("/api/rooms/{id}/clear"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, state) = call(&app, Method::GET, &format!("/api/rooms/{id}/state"), None).await;
        assert_eq!(state["isRevealed"], false);
        assert_eq!(state["users"][0]["isVoted"], false);

        let (status, user) = call(
            &app,
            Method::PATCH,
            &format!("/api/rooms/{id}/users/u1"),
            Some(json!({"name": "Ally"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["name"], "Ally");

        let (status, _) = call(&app, Method::DELETE, &format!("/api/rooms/{id}/users/u1"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, stats) = call(&app, Method::GET, "/api/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalRooms"], 1);
        assert_eq!(stats["totalUsers"], 0);

        let (status, tasks) = call(&app, Method::GET, &format!("/api/rooms/{id}/tasks"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tasks["tasks"], json!([]));
    }

    #[tokio::test]
    async fn join_without_user_id_generates_one() {
        let app = make_server().router();
        let id = create_room(&app).await;
        let (status, user) = call(
            &app,
            Method::POST,
            &format!("/api/rooms/{id}/users"),
            Some(json!({"name": "Bob"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(!user["id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn errors_map_to_statuses() {
        let app = make_server().router();
        let (status, body) = call(&app, Method::GET, "/api/rooms/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, body) = call(&app, Method::POST, "/api/rooms", Some(json!({"name": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");

        let id = create_room(&app).await;
        let join = json!({"userId": "u1", "name": "Alice"});
        let uri = format!("/api/rooms/{id}/users");
        let (status, _) = call(&app, Method::POST, &uri, Some(join.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = call(&app, Method::POST, &uri, Some(join)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "ALREADY_EXISTS");

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/rooms/{id}/votes"),
            Some(json!({"userId": "u1", "value": "4"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_VOTE");
    }

    #[tokio::test]
    async fn ws_requires_user_and_nickname() {
        let app = make_server().router();
        for uri in [
            "/ws/rooms/r1",
            "/ws/rooms/r1?userId=u1",
            "/ws/rooms/r1?nickname=Alice",
            "/ws/rooms/r1?userId=&nickname=Alice",
        ] {
            let (status, body) = call(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["code"], "INVALID_INPUT");
        }
    }

    #[tokio::test]
    async fn listen_binds_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().track("http", handle);
        assert!(server.shutdown().graceful_shutdown(Some(std::time::Duration::from_secs(5))).await);
    }
}
