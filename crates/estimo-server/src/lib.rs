//! # estimo-server
//!
//! Axum HTTP + `WebSocket` server for estimation rooms.
//!
//! - REST endpoints over the service façade: rooms, users, votes, tasks, stats, health
//! - `WebSocket` gateway at `/ws/rooms/{id}`: one session task per socket, split into
//!   a read loop, a write loop and a heartbeat monitor
//! - [`websocket::hub::Hub`]: per-room fan-out driven by a single command loop
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod rest;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, EstimoServer};
pub use shutdown::ShutdownCoordinator;
