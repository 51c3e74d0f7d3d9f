use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TaskError;
use crate::store::TaskStore;
use crate::tasks;
use crate::types::TaskOrigin;

/// Uniform adapter every task is registered as.
///
/// The adapter decodes its own positional arguments (see [`decode_arg`]), so a
/// mismatch surfaces as [`TaskError::BadArgument`] rather than a panic.
pub type TaskFn = fn(&TaskContext, &[Value]) -> Result<Value, TaskError>;

/// Handed to every task body: the store for execution records plus the
/// origin of the run.
#[derive(Clone)]
pub struct TaskContext {
    store: Arc<dyn TaskStore>,
    origin: TaskOrigin,
}

impl TaskContext {
    pub fn new(store: Arc<dyn TaskStore>, origin: TaskOrigin) -> Self {
        Self { store, origin }
    }

    pub fn store(&self) -> &dyn TaskStore {
        self.store.as_ref()
    }

    pub fn origin(&self) -> TaskOrigin {
        self.origin
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Name → task function table. Built once at startup, read-only afterwards.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<&'static str, TaskFn>,
}

impl TaskRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The tasks shipped with cadence.
    pub fn builtin() -> Self {
        Self::new().with(tasks::CALC_FIB, tasks::calc_fib)
    }

    /// Add (or replace) a task under `name`.
    pub fn with(mut self, name: &'static str, task: TaskFn) -> Self {
        self.tasks.insert(name, task);
        self
    }

    pub fn get(&self, name: &str) -> Option<TaskFn> {
        self.tasks.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered task names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.keys().copied().collect()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.tasks.keys()).finish()
    }
}

/// Decode positional argument `index` into `T`.
pub fn decode_arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, TaskError> {
    let value = args.get(index).ok_or_else(|| TaskError::BadArgument {
        index,
        reason: format!("missing (got {} arguments)", args.len()),
    })?;
    T::deserialize(value).map_err(|e| TaskError::BadArgument {
        index,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(_ctx: &TaskContext, args: &[Value]) -> Result<Value, TaskError> {
        Ok(Value::Array(args.to_vec()))
    }

    #[test]
    fn builtin_contains_calc_fib() {
        let registry = TaskRegistry::builtin();
        assert!(registry.contains("CalcFib"));
        assert!(!registry.contains("NoSuchTask"));
        assert!(registry.get("NoSuchTask").is_none());
    }

    #[test]
    fn names_are_sorted() {
        let registry = TaskRegistry::builtin().with("Echo", echo);
        assert_eq!(registry.names(), vec!["CalcFib", "Echo"]);
    }

    #[test]
    fn decode_arg_types() {
        let args = vec![json!(10), json!("x")];
        assert_eq!(decode_arg::<u32>(&args, 0).unwrap(), 10);
        assert_eq!(decode_arg::<f64>(&args, 0).unwrap(), 10.0);
        assert_eq!(decode_arg::<String>(&args, 1).unwrap(), "x");
    }

    #[test]
    fn decode_arg_mismatch_and_missing() {
        let args = vec![json!("ten")];
        assert!(matches!(
            decode_arg::<u32>(&args, 0),
            Err(TaskError::BadArgument { index: 0, .. })
        ));
        assert!(matches!(
            decode_arg::<u32>(&args, 3),
            Err(TaskError::BadArgument { index: 3, .. })
        ));
    }
}
