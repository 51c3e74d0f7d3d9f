use thiserror::Error;

use crate::types::TaskId;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored JSON (task arguments, results) could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cron expression could not be parsed.
    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    /// No periodic task with the given ID exists in the store.
    #[error("Periodic task not found: {id}")]
    TaskNotFound { id: TaskId },

    /// A create/dispatch request was rejected before reaching the scheduler.
    #[error("Validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors produced by a task body. Logged by the dispatcher, never propagated.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A positional argument was missing or had the wrong shape.
    #[error("bad argument #{index}: {reason}")]
    BadArgument { index: usize, reason: String },

    /// The task could not record its execution.
    #[error("store error: {0}")]
    Store(#[from] SchedulerError),

    #[error("task failed: {0}")]
    Failed(String),
}
