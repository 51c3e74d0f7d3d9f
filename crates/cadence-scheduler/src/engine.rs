use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use cadence_core::config::SchedulerConfig;
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn};

use crate::cron::{CronEngine, CronFuture, CronJob, EntryId};
use crate::dispatch::{Dispatcher, TaskHandle};
use crate::entry_map::{EntryMap, ScheduleEntry};
use crate::error::{Result, SchedulerError};
use crate::registry::TaskContext;
use crate::store::TaskStore;
use crate::types::{PeriodicTask, TaskId, TaskOrigin};

/// What a single firing of a periodic task did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Handed to the dispatcher.
    Dispatched,
    /// Deleted since registration; the next reload drops the entry.
    NotFound,
    /// Disabled since registration; the next reload drops the entry.
    Disabled,
    /// Stored arguments are not a JSON array.
    BadArguments,
    /// Name no longer present in the registry.
    UnknownTask,
    /// The store could not be read; retried on the next natural firing.
    StoreError,
}

/// Keeps the cron engine's live entries in step with the periodic tasks in
/// the store, and reloads itself on a fixed schedule.
///
/// Build one per process with [`TaskScheduler::new`], call
/// [`init`](Self::init) and [`load_tasks`](Self::load_tasks), then park on
/// [`run`](Self::run). Only one scheduler process may run against a store:
/// there is no distributed locking.
pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    cron: Arc<dyn CronEngine>,
    dispatcher: Dispatcher,
    entries: EntryMap,
    reload_cron: String,
    /// Cron entry of the self-reload job once `init` has run.
    reload_entry: Mutex<Option<EntryId>>,
    /// Serialises reconciliation so register's check-then-insert is atomic.
    reconcile: Mutex<()>,
}

impl TaskScheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        cron: Arc<dyn CronEngine>,
        dispatcher: Dispatcher,
        config: &SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            cron,
            dispatcher,
            entries: EntryMap::new(),
            reload_cron: config.reload_cron.clone(),
            reload_entry: Mutex::new(None),
            reconcile: Mutex::new(()),
        })
    }

    /// Register the self-reload job. Later calls are no-ops.
    ///
    /// Fails only when the configured reload expression does not parse,
    /// which callers should treat as fatal.
    pub fn init(self: &Arc<Self>) -> Result<()> {
        let mut slot = self
            .reload_entry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(());
        }

        // Weak: the cron engine must not keep the scheduler alive.
        let weak = Arc::downgrade(self);
        let job: CronJob = Arc::new(move || -> CronFuture {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(scheduler) = weak.upgrade() else {
                    return;
                };
                match tokio::task::spawn_blocking(move || scheduler.load_tasks()).await {
                    Ok(Ok(count)) => debug!(count, "periodic tasks reloaded"),
                    Ok(Err(e)) => warn!(error = %e, "failed to reload periodic tasks"),
                    Err(e) => error!(error = %e, "periodic task reload aborted"),
                }
            })
        });

        let id = self.cron.schedule(&self.reload_cron, job)?;
        *slot = Some(id);
        info!(cron = %self.reload_cron, "task scheduler initialized");
        Ok(())
    }

    /// Drive the cron engine for the life of the process.
    pub async fn run(&self) {
        self.cron.run().await
    }

    /// Reconcile live entries against every periodic task in the store.
    ///
    /// Disabled tasks are unregistered, enabled ones registered (no-op when
    /// already live), and entries whose task vanished from the store are
    /// unregistered. Returns the number of live entries.
    ///
    /// The pass does not abort on the first registration failure: remaining
    /// tasks are still registered and the reverse diff still runs, then the
    /// first error is returned. A caller that sees `Err` must not assume the
    /// pass stopped where the error occurred.
    pub fn load_tasks(&self) -> Result<usize> {
        let _reconcile = self.reconcile.lock().unwrap_or_else(PoisonError::into_inner);
        let tasks = self.store.find_all_periodic_tasks()?;

        let mut live = HashSet::with_capacity(tasks.len());
        let mut first_err: Option<SchedulerError> = None;
        for task in &tasks {
            if !task.enabled {
                self.unregister(task.id);
                continue;
            }
            live.insert(task.id);
            if let Err(e) = self.register(task) {
                error!(task_id = task.id, name = %task.name, error = %e, "failed to register {task}");
                first_err.get_or_insert(e);
            }
        }

        for task_id in self.entries.task_ids() {
            if !live.contains(&task_id) {
                self.unregister(task_id);
            }
        }

        let count = self.entries.len();
        debug!(count, "periodic tasks loaded");
        match first_err {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Schedule `task` unless it is already live.
    ///
    /// An existing entry is kept as-is even if the stored cron expression has
    /// changed since; disable and re-enable the task to pick up a new one.
    fn register(&self, task: &PeriodicTask) -> Result<()> {
        if self.entries.get(task.id).is_some() {
            return Ok(());
        }
        info!(
            task_id = task.id,
            name = %task.name,
            cron = %task.cron,
            args = %task.args,
            "register {task}"
        );

        let store = Arc::clone(&self.store);
        let dispatcher = self.dispatcher.clone();
        let task_id = task.id;
        let name = task.name.clone();
        let job: CronJob = Arc::new(move || -> CronFuture {
            let store = Arc::clone(&store);
            let dispatcher = dispatcher.clone();
            let name = name.clone();
            Box::pin(async move {
                let fired =
                    tokio::task::spawn_blocking(move || fire(&store, &dispatcher, task_id, &name));
                if let Err(e) = fired.await {
                    error!(task_id, error = %e, "periodic task firing aborted");
                }
            })
        });

        let handle = self.cron.schedule(&task.cron, job)?;
        self.entries.set(
            task.id,
            ScheduleEntry {
                task_id: task.id,
                handle,
                name: task.name.clone(),
            },
        );
        Ok(())
    }

    /// Remove the live entry of `task_id`, if any.
    fn unregister(&self, task_id: TaskId) {
        let Some(entry) = self.entries.get(task_id) else {
            return;
        };
        info!(task_id, name = %entry.name, "unregister periodic task {} (id: {task_id})", entry.name);
        self.cron.unschedule(entry.handle);
        self.entries.delete(task_id);
    }

    /// Live entries, keyed by periodic task ID.
    pub fn entries(&self) -> &EntryMap {
        &self.entries
    }

    /// Names accepted by [`apply_task`](Self::apply_task) and periodic tasks.
    pub fn registered_tasks(&self) -> Vec<&'static str> {
        self.dispatcher.registry().names()
    }

    /// Dispatch a one-shot task without waiting for it.
    pub fn apply_task(&self, name: &str, args: Vec<Value>) -> Option<TaskHandle> {
        let ctx = TaskContext::new(Arc::clone(&self.store), TaskOrigin::OneShot);
        self.dispatcher.apply_task(ctx, name, args)
    }
}

/// Body of every periodic task firing.
///
/// Re-reads the definition so edits since registration are honoured, then
/// hands the decoded arguments to the dispatcher. Never fails; problems are
/// logged and reported through the outcome.
pub fn fire(
    store: &Arc<dyn TaskStore>,
    dispatcher: &Dispatcher,
    task_id: TaskId,
    name: &str,
) -> FireOutcome {
    let span = info_span!("periodic_task", task_id, name = %name);
    let _entered = span.enter();

    let task = match store.find_periodic_task(task_id) {
        Ok(task) => task,
        Err(SchedulerError::TaskNotFound { .. }) => {
            info!("periodic task {name} (id: {task_id}) not found in store, skip run");
            return FireOutcome::NotFound;
        }
        Err(e) => {
            error!(error = %e, "failed to reload periodic task {name} (id: {task_id}) from store");
            return FireOutcome::StoreError;
        }
    };

    if !task.enabled {
        info!("{task} is disabled, skip run");
        return FireOutcome::Disabled;
    }

    let args = match task.decode_args() {
        Ok(args) => args,
        Err(e) => {
            error!(args = %task.args, error = %e, "failed to decode {task} args");
            return FireOutcome::BadArguments;
        }
    };

    let ctx = TaskContext::new(Arc::clone(store), TaskOrigin::Periodic { id: task.id });
    match dispatcher.apply_task(ctx, &task.name, args) {
        Some(_detached) => FireOutcome::Dispatched,
        None => FireOutcome::UnknownTask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::TokioCron;
    use crate::registry::TaskRegistry;
    use crate::store::SqliteTaskStore;
    use rusqlite::Connection;

    fn scheduler(reload_cron: &str) -> (Arc<TokioCron>, Arc<TaskScheduler>) {
        let store = Arc::new(SqliteTaskStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let cron = Arc::new(TokioCron::new());
        let config = SchedulerConfig {
            reload_cron: reload_cron.to_string(),
        };
        let scheduler = TaskScheduler::new(
            store,
            cron.clone(),
            Dispatcher::new(Arc::new(TaskRegistry::builtin())),
            &config,
        );
        (cron, scheduler)
    }

    #[test]
    fn init_registers_reload_once() {
        let (cron, scheduler) = scheduler("*/5 * * * *");
        scheduler.init().unwrap();
        scheduler.init().unwrap();
        assert_eq!(cron.len(), 1);
        assert!(scheduler.entries().is_empty());
    }

    #[test]
    fn concurrent_init_registers_reload_once() {
        let (cron, scheduler) = scheduler("*/5 * * * *");
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                std::thread::spawn(move || scheduler.init().unwrap())
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(cron.len(), 1);
    }

    #[test]
    fn init_with_bad_reload_cron_fails() {
        let (cron, scheduler) = scheduler("every five minutes");
        assert!(matches!(
            scheduler.init(),
            Err(SchedulerError::InvalidCron { .. })
        ));
        assert!(cron.is_empty());
    }

    #[test]
    fn load_tasks_on_empty_store() {
        let (_cron, scheduler) = scheduler("*/5 * * * *");
        assert_eq!(scheduler.load_tasks().unwrap(), 0);
    }

    #[test]
    fn registered_tasks_lists_registry() {
        let (_cron, scheduler) = scheduler("*/5 * * * *");
        assert_eq!(scheduler.registered_tasks(), vec!["CalcFib"]);
    }
}
