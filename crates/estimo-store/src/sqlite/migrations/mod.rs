//! Schema migration runner.
//!
//! Migrations are embedded at compile time via [`include_str!`] and executed
//! in version order, each inside its own transaction. The `schema_version`
//! table records what has been applied; re-running is a no-op.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "rooms and tasks",
    sql: include_str!("v001_schema.sql"),
}];

fn migration_err(message: String) -> StoreError {
    StoreError::Migration { message }
}

/// Apply every pending migration. Returns how many ran.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| migration_err(format!("failed to create schema_version table: {e}")))?;

    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| migration_err(format!("v{}: begin failed: {e}", migration.version)))?;
        tx.execute_batch(migration.sql).map_err(|e| {
            migration_err(format!(
                "v{} ({}) failed: {e}",
                migration.version, migration.description
            ))
        })?;
        let _ = tx
            .execute(
                "INSERT INTO schema_version (version, applied_at, description)
                 VALUES (?1, datetime('now'), ?2)",
                rusqlite::params![migration.version, migration.description],
            )
            .map_err(|e| migration_err(format!("v{}: record failed: {e}", migration.version)))?;
        tx.commit()
            .map_err(|e| migration_err(format!("v{}: commit failed: {e}", migration.version)))?;
        applied += 1;
    }

    if applied == 0 {
        debug!(current, "schema up to date");
    }
    Ok(applied)
}

/// Highest applied migration version, or 0.
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| migration_err(format!("failed to read schema_version: {e}")))
}

/// Latest migration version defined in code.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;

    fn open_memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn applies_then_skips() {
        let conn = open_memory();
        assert_eq!(run_migrations(&conn).unwrap(), 1);
        assert_eq!(run_migrations(&conn).unwrap(), 0);
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn deleting_room_cascades_to_tasks() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO rooms (id, name, created_at, updated_at) VALUES ('r1', 'R', 'now', 'now');
             INSERT INTO tasks (id, room_id, headline, position) VALUES ('t1', 'r1', 'h', 1);
             DELETE FROM rooms WHERE id = 'r1';",
        )
        .unwrap();
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(left, 0);
    }

    #[test]
    fn task_requires_existing_room() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO tasks (id, room_id, headline, position) VALUES ('t1', 'nope', 'h', 1)",
            [],
        );
        assert!(result.is_err());
    }
}
