//! `WebSocket` gateway: connection handles, the room hub, the wire protocol,
//! message dispatch, heartbeat and the per-socket session.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod hub;
pub mod protocol;
pub mod session;
