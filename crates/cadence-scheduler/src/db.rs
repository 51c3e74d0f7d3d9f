use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `periodic_tasks` definitions table and the `tasks` execution
/// log. Safe to call on every startup (`IF NOT EXISTS` throughout).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS periodic_tasks (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            cron        TEXT    NOT NULL,
            name        TEXT    NOT NULL,
            args        TEXT    NOT NULL DEFAULT '[]',  -- JSON array
            enabled     INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT    NOT NULL,
            args        TEXT    NOT NULL,               -- JSON payload
            result      TEXT,                           -- JSON or NULL while running
            started_at  TEXT    NOT NULL,
            duration_ms INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_started_at ON tasks (started_at);
        ",
    )?;
    Ok(())
}
