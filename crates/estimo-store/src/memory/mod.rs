//! Process-local storage: the live room table and in-memory repositories.

pub mod live;
pub mod repos;
