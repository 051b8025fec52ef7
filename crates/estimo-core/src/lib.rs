//! # estimo-core
//!
//! Foundation types for the estimo planning-poker server.
//!
//! This crate provides the shared vocabulary that all other estimo crates depend on:
//!
//! - **Errors**: [`EstimoError`] taxonomy via `thiserror`, with [`ErrorKind`] for transport mapping
//! - **Vote rules**: card vocabularies, validation, averaging and nearest-card rounding
//! - **Entities**: [`Room`], [`User`], [`Task`] with their validation rules
//! - **Ports**: [`RoomRepository`], [`TaskRepository`] and [`LiveRoomStore`] capability traits
//! - **Logging**: `tracing` subscriber setup and a capture layer for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod ports;
pub mod room;
pub mod task;
pub mod user;
pub mod vote;

pub use errors::{ErrorKind, EstimoError, Result};
pub use ports::{JoinPolicy, LiveRoomState, LiveRoomStore, RoomRepository, StoreStats, TaskRepository};
pub use room::{Room, RoomSettings};
pub use task::Task;
pub use user::User;
pub use vote::{Vote, VotingSystem};
