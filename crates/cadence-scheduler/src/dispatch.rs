use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span};

use crate::error::TaskError;
use crate::registry::{TaskContext, TaskRegistry};

/// Completion handle of a dispatched task. Dropping it detaches the task.
pub type TaskHandle = JoinHandle<Result<Value, TaskError>>;

/// Fire-and-forget invocation of registered tasks by name.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<TaskRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Run task `name` with `args` on the blocking pool without waiting for it.
    ///
    /// Unknown names are logged and yield `None`. Task errors are logged with
    /// the task name and arguments; callers that care may await the handle.
    /// There is no bound on concurrently running tasks and no cancellation.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn apply_task(&self, ctx: TaskContext, name: &str, args: Vec<Value>) -> Option<TaskHandle> {
        let Some(task) = self.registry.get(name) else {
            error!(task = %name, origin = %ctx.origin(), "task func {name} not found");
            return None;
        };

        let name = name.to_string();
        let span = info_span!("task", name = %name, origin = %ctx.origin());
        Some(tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let outcome = task(&ctx, &args);
            match &outcome {
                Ok(value) => debug!(result = %value, "task completed"),
                Err(e) => {
                    error!(args = ?args, error = %e, "apply task {name} failed");
                }
            }
            outcome
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteTaskStore;
    use crate::types::TaskOrigin;
    use rusqlite::Connection;
    use serde_json::json;

    fn ctx() -> TaskContext {
        let store = SqliteTaskStore::new(Connection::open_in_memory().unwrap()).unwrap();
        TaskContext::new(Arc::new(store), TaskOrigin::OneShot)
    }

    fn sum(_ctx: &TaskContext, args: &[Value]) -> Result<Value, TaskError> {
        let a: i64 = crate::registry::decode_arg(args, 0)?;
        let b: i64 = crate::registry::decode_arg(args, 1)?;
        Ok(json!(a + b))
    }

    fn fail(_ctx: &TaskContext, _args: &[Value]) -> Result<Value, TaskError> {
        Err(TaskError::Failed("boom".to_string()))
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(
            TaskRegistry::builtin().with("Sum", sum).with("Fail", fail),
        ))
    }

    #[tokio::test]
    async fn applies_with_args_in_order() {
        let handle = dispatcher()
            .apply_task(ctx(), "Sum", vec![json!(2), json!(40)])
            .expect("registered");
        assert_eq!(handle.await.unwrap().unwrap(), json!(42));
    }

    #[tokio::test]
    async fn calc_fib_through_dispatcher() {
        let handle = dispatcher()
            .apply_task(ctx(), "CalcFib", vec![json!(10)])
            .expect("registered");
        assert_eq!(handle.await.unwrap().unwrap(), json!(55));
    }

    #[tokio::test]
    async fn unknown_name_is_not_invoked() {
        assert!(dispatcher().apply_task(ctx(), "NoSuchTask", vec![]).is_none());
    }

    #[tokio::test]
    async fn task_errors_are_returned_not_raised() {
        let handle = dispatcher().apply_task(ctx(), "Fail", vec![]).unwrap();
        assert!(matches!(handle.await.unwrap(), Err(TaskError::Failed(_))));

        let handle = dispatcher()
            .apply_task(ctx(), "Sum", vec![json!(1)])
            .unwrap();
        assert!(matches!(
            handle.await.unwrap(),
            Err(TaskError::BadArgument { index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn dropped_handle_still_runs() {
        let store = Arc::new(SqliteTaskStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let ctx = TaskContext::new(store.clone(), TaskOrigin::OneShot);
        drop(dispatcher().apply_task(ctx, "CalcFib", vec![json!(5)]));

        for _ in 0..100 {
            if crate::store::TaskStore::list_executions(store.as_ref(), 0, 1).unwrap().0 == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("detached task never recorded its execution");
    }
}
