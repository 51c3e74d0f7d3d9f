use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{NewPeriodicTask, PeriodicTask, TaskExecution, TaskId};

/// Durable source of truth for periodic task definitions and execution records.
///
/// The scheduler only reads definitions; task bodies write execution records.
/// Implementations provide their own synchronisation.
pub trait TaskStore: Send + Sync {
    /// Every definition, enabled or not.
    fn find_all_periodic_tasks(&self) -> Result<Vec<PeriodicTask>>;

    /// A single definition. Missing rows are [`SchedulerError::TaskNotFound`].
    fn find_periodic_task(&self, id: TaskId) -> Result<PeriodicTask>;

    fn create_periodic_task(&self, task: &NewPeriodicTask) -> Result<PeriodicTask>;

    /// Persist `cron`, `name`, `args` and `enabled` of an existing row.
    fn update_periodic_task(&self, task: &PeriodicTask) -> Result<()>;

    /// Delete a definition. Deleting an absent ID is not an error.
    fn delete_periodic_task(&self, id: TaskId) -> Result<()>;

    /// Insert an execution record at task start.
    fn create_execution(&self, name: &str, args: &str, started_at: &str)
        -> Result<TaskExecution>;

    /// Write back `result` and `duration_ms` once the task completes.
    fn save_execution(&self, execution: &TaskExecution) -> Result<()>;

    /// Total number of records plus one page, newest first.
    fn list_executions(&self, offset: usize, limit: usize) -> Result<(u64, Vec<TaskExecution>)>;

    /// Flip `enabled` and return the new state.
    fn toggle_periodic_task(&self, id: TaskId) -> Result<bool> {
        let mut task = self.find_periodic_task(id)?;
        task.enabled = !task.enabled;
        self.update_periodic_task(&task)?;
        Ok(task.enabled)
    }
}

/// SQLite-backed [`TaskStore`].
///
/// Wraps a single connection in a `Mutex`; every query is short, so a pool
/// would buy little for a single scheduler process.
pub struct SqliteTaskStore {
    db: Mutex<Connection>,
}

const PERIODIC_COLUMNS: &str = "id, cron, name, args, enabled, created_at, updated_at";
const EXECUTION_COLUMNS: &str = "id, name, args, result, started_at, duration_ms";

impl SqliteTaskStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-query leaves the connection itself usable.
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskStore for SqliteTaskStore {
    #[instrument(skip(self))]
    fn find_all_periodic_tasks(&self) -> Result<Vec<PeriodicTask>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {PERIODIC_COLUMNS} FROM periodic_tasks ORDER BY id DESC"
        ))?;
        let tasks = stmt
            .query_map([], row_to_periodic_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(count = tasks.len(), "periodic tasks queried");
        Ok(tasks)
    }

    #[instrument(skip(self))]
    fn find_periodic_task(&self, id: TaskId) -> Result<PeriodicTask> {
        let db = self.conn();
        db.query_row(
            &format!("SELECT {PERIODIC_COLUMNS} FROM periodic_tasks WHERE id = ?1"),
            [id],
            row_to_periodic_task,
        )
        .optional()?
        .ok_or(SchedulerError::TaskNotFound { id })
    }

    #[instrument(skip(self), fields(name = %task.name, cron = %task.cron))]
    fn create_periodic_task(&self, task: &NewPeriodicTask) -> Result<PeriodicTask> {
        let args = serde_json::to_string(&task.args)?;
        let now = Utc::now().to_rfc3339();
        let db = self.conn();
        db.execute(
            "INSERT INTO periodic_tasks (cron, name, args, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            rusqlite::params![task.cron, task.name, args, now],
        )?;
        let id = db.last_insert_rowid();
        info!(task_id = id, "periodic task created");
        Ok(PeriodicTask {
            id,
            cron: task.cron.clone(),
            name: task.name.clone(),
            args,
            enabled: true,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    #[instrument(skip(self), fields(task_id = task.id))]
    fn update_periodic_task(&self, task: &PeriodicTask) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.conn();
        let n = db.execute(
            "UPDATE periodic_tasks
             SET cron = ?1, name = ?2, args = ?3, enabled = ?4, updated_at = ?5
             WHERE id = ?6",
            rusqlite::params![task.cron, task.name, task.args, task.enabled, now, task.id],
        )?;
        if n == 0 {
            return Err(SchedulerError::TaskNotFound { id: task.id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_periodic_task(&self, id: TaskId) -> Result<()> {
        let n = self
            .conn()
            .execute("DELETE FROM periodic_tasks WHERE id = ?1", [id])?;
        if n > 0 {
            info!(task_id = id, "periodic task deleted");
        }
        Ok(())
    }

    #[instrument(skip(self, args))]
    fn create_execution(
        &self,
        name: &str,
        args: &str,
        started_at: &str,
    ) -> Result<TaskExecution> {
        let db = self.conn();
        db.execute(
            "INSERT INTO tasks (name, args, result, started_at, duration_ms)
             VALUES (?1, ?2, NULL, ?3, NULL)",
            rusqlite::params![name, args, started_at],
        )?;
        Ok(TaskExecution {
            id: db.last_insert_rowid(),
            name: name.to_string(),
            args: args.to_string(),
            result: None,
            started_at: started_at.to_string(),
            duration_ms: None,
        })
    }

    #[instrument(skip(self), fields(execution_id = execution.id))]
    fn save_execution(&self, execution: &TaskExecution) -> Result<()> {
        self.conn().execute(
            "UPDATE tasks SET name = ?1, args = ?2, result = ?3, started_at = ?4, duration_ms = ?5
             WHERE id = ?6",
            rusqlite::params![
                execution.name,
                execution.args,
                execution.result,
                execution.started_at,
                execution.duration_ms,
                execution.id
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn list_executions(&self, offset: usize, limit: usize) -> Result<(u64, Vec<TaskExecution>)> {
        let db = self.conn();
        let total: i64 = db.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        let mut stmt = db.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM tasks
             ORDER BY started_at DESC, id DESC
             LIMIT ?1 OFFSET ?2"
        ))?;
        let page = stmt
            .query_map(
                rusqlite::params![limit as i64, offset as i64],
                row_to_execution,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total as u64, page))
    }
}

fn row_to_periodic_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<PeriodicTask> {
    Ok(PeriodicTask {
        id: row.get(0)?,
        cron: row.get(1)?,
        name: row.get(2)?,
        args: row.get(3)?,
        enabled: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskExecution> {
    Ok(TaskExecution {
        id: row.get(0)?,
        name: row.get(1)?,
        args: row.get(2)?,
        result: row.get(3)?,
        started_at: row.get(4)?,
        duration_ms: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteTaskStore {
        SqliteTaskStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn new_task(name: &str, cron: &str) -> NewPeriodicTask {
        NewPeriodicTask {
            name: name.to_string(),
            cron: cron.to_string(),
            args: vec![json!(10)],
        }
    }

    #[test]
    fn create_then_find() {
        let store = store();
        let created = store.create_periodic_task(&new_task("CalcFib", "*/5 * * * *")).unwrap();
        assert!(created.enabled);
        assert_eq!(created.args, "[10]");

        let found = store.find_periodic_task(created.id).unwrap();
        assert_eq!(found, created);
        assert_eq!(found.decode_args().unwrap(), vec![json!(10)]);
    }

    #[test]
    fn find_missing_is_not_found() {
        let err = store().find_periodic_task(42).unwrap_err();
        assert!(matches!(err, SchedulerError::TaskNotFound { id: 42 }));
    }

    #[test]
    fn find_all_includes_disabled() {
        let store = store();
        let a = store.create_periodic_task(&new_task("CalcFib", "* * * * *")).unwrap();
        let b = store.create_periodic_task(&new_task("CalcFib", "0 * * * *")).unwrap();
        store.toggle_periodic_task(a.id).unwrap();

        let all = store.find_all_periodic_tasks().unwrap();
        assert_eq!(all.len(), 2);
        // newest first
        assert_eq!(all[0].id, b.id);
        assert!(!all[1].enabled);
    }

    #[test]
    fn toggle_flips_and_reports_state() {
        let store = store();
        let task = store.create_periodic_task(&new_task("CalcFib", "* * * * *")).unwrap();
        assert!(!store.toggle_periodic_task(task.id).unwrap());
        assert!(store.toggle_periodic_task(task.id).unwrap());
        assert!(store.find_periodic_task(task.id).unwrap().enabled);
    }

    #[test]
    fn toggle_missing_is_not_found() {
        assert!(matches!(
            store().toggle_periodic_task(7),
            Err(SchedulerError::TaskNotFound { id: 7 })
        ));
    }

    #[test]
    fn update_persists_fields() {
        let store = store();
        let mut task = store.create_periodic_task(&new_task("CalcFib", "* * * * *")).unwrap();
        task.cron = "0 3 * * *".to_string();
        task.args = "[20]".to_string();
        store.update_periodic_task(&task).unwrap();

        let found = store.find_periodic_task(task.id).unwrap();
        assert_eq!(found.cron, "0 3 * * *");
        assert_eq!(found.args, "[20]");
    }

    #[test]
    fn delete_is_idempotent() {
        let store = store();
        let task = store.create_periodic_task(&new_task("CalcFib", "* * * * *")).unwrap();
        store.delete_periodic_task(task.id).unwrap();
        store.delete_periodic_task(task.id).unwrap();
        assert!(store.find_all_periodic_tasks().unwrap().is_empty());
    }

    #[test]
    fn execution_lifecycle_and_paging() {
        let store = store();
        let mut first = store
            .create_execution("CalcFib", r#"{"n": 1}"#, "2026-01-01T00:00:00+00:00")
            .unwrap();
        assert!(first.result.is_none());
        first.result = Some("1".to_string());
        first.duration_ms = Some(3);
        store.save_execution(&first).unwrap();
        store
            .create_execution("CalcFib", r#"{"n": 2}"#, "2026-01-02T00:00:00+00:00")
            .unwrap();

        let (total, page) = store.list_executions(0, 1).unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].args, r#"{"n": 2}"#);

        let (_, page) = store.list_executions(1, 10).unwrap();
        assert_eq!(page, vec![first]);
    }
}
