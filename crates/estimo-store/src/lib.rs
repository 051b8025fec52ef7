//! # estimo-store
//!
//! Storage behind the estimo ports:
//!
//! - [`RoomStateStore`]: the in-memory live room table (users, votes, reveal flag,
//!   active task) behind one `RwLock`, with a background reaper for idle empty rooms
//! - [`InMemoryRoomRepository`] / [`InMemoryTaskRepository`]: process-local durable side
//! - [`SqliteRoomRepository`] / [`SqliteTaskRepository`]: `rusqlite` + `r2d2` durable side
//!   with embedded migrations

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod sqlite;

pub use errors::{Result, StoreError};
pub use memory::live::{ReaperConfig, RoomStateStore};
pub use memory::repos::{InMemoryRoomRepository, InMemoryTaskRepository};
pub use sqlite::{SqliteRoomRepository, SqliteTaskRepository};
