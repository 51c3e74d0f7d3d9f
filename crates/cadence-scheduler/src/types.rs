use serde::{Deserialize, Serialize};

/// Primary key of a periodic task row.
pub type TaskId = i64;

/// A persisted periodic task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicTask {
    pub id: TaskId,
    /// Cron expression, standard 5-field (`min hour dom mon dow`).
    pub cron: String,
    /// Must match a key of the task registry.
    pub name: String,
    /// JSON array of positional arguments, stored verbatim.
    pub args: String,
    pub enabled: bool,
    /// ISO-8601 timestamp of creation.
    pub created_at: String,
    /// ISO-8601 timestamp of the last update.
    pub updated_at: String,
}

impl PeriodicTask {
    /// Decode the stored arguments into positional values.
    pub fn decode_args(&self) -> serde_json::Result<Vec<serde_json::Value>> {
        serde_json::from_str(&self.args)
    }
}

impl std::fmt::Display for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "periodic task {} (id: {})", self.name, self.id)
    }
}

/// Fields needed to insert a new periodic task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPeriodicTask {
    pub name: String,
    pub cron: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

/// One execution of a task body, written at start and completed at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: i64,
    pub name: String,
    /// JSON payload describing the inputs.
    pub args: String,
    /// JSON payload of the output; `None` while running or after a failure.
    pub result: Option<String>,
    /// ISO-8601 timestamp of the execution start.
    pub started_at: String,
    /// Wall-clock duration in milliseconds, set on completion.
    pub duration_ms: Option<i64>,
}

/// Where a dispatched run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOrigin {
    /// Applied directly by a caller, not tied to a schedule.
    OneShot,
    /// Fired by the cron entry of a periodic task.
    Periodic { id: TaskId },
}

impl std::fmt::Display for TaskOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOrigin::OneShot => write!(f, "one-shot"),
            TaskOrigin::Periodic { id } => write!(f, "periodic:{id}"),
        }
    }
}
