use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cadence_core::CadenceConfig;
use cadence_scheduler::{
    CronEngine, Dispatcher, OneShotRequest, PeriodicTaskRequest, TaskContext, TaskOrigin,
    TaskRegistry, TaskScheduler, TaskStore, TokioCron,
};
use serde_json::Value;
use tracing::info;

use crate::cli::{PeriodicCommand, TaskCommand};

/// load tasks → run, until Ctrl-C.
pub async fn run_scheduler(
    config: &CadenceConfig,
    store: Arc<dyn TaskStore>,
    registry: Arc<TaskRegistry>,
) -> Result<()> {
    let cron: Arc<dyn CronEngine> = Arc::new(TokioCron::new());
    let scheduler = TaskScheduler::new(store, cron, Dispatcher::new(registry), &config.scheduler);
    scheduler
        .init()
        .context("failed to register periodic task reload")?;

    // Refuse to start on a schedule we cannot load; later reloads only warn.
    let loader = Arc::clone(&scheduler);
    let loaded = tokio::task::spawn_blocking(move || loader.load_tasks())
        .await?
        .context("failed to load periodic tasks")?;
    info!(loaded, reload_cron = %config.scheduler.reload_cron, "scheduler started");

    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("scheduler shutting down, in-flight tasks are abandoned");
        }
    }
    Ok(())
}

pub fn periodic(
    command: PeriodicCommand,
    store: &dyn TaskStore,
    registry: &TaskRegistry,
) -> Result<()> {
    match command {
        PeriodicCommand::List => {
            let tasks = store.find_all_periodic_tasks()?;
            if tasks.is_empty() {
                println!("no periodic tasks");
            }
            for task in tasks {
                println!(
                    "{:>5}  {:<8}  {:<16}  {:<20}  {}",
                    task.id,
                    if task.enabled { "enabled" } else { "disabled" },
                    task.name,
                    task.cron,
                    task.args
                );
            }
        }
        PeriodicCommand::Add { name, cron, args } => {
            let request = PeriodicTaskRequest {
                name,
                cron,
                args: parse_args(&args)?,
            };
            let task = store.create_periodic_task(&request.into_new_task(registry)?)?;
            println!("created {task}; picked up on the next scheduler reload");
        }
        PeriodicCommand::Delete { id } => {
            store.delete_periodic_task(id)?;
            println!("deleted periodic task {id}");
        }
        PeriodicCommand::Toggle { id } => {
            let enabled = store.toggle_periodic_task(id)?;
            println!(
                "periodic task {id} {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }
    Ok(())
}

pub async fn task(
    command: TaskCommand,
    store: Arc<dyn TaskStore>,
    registry: Arc<TaskRegistry>,
) -> Result<()> {
    match command {
        TaskCommand::Apply { name, args } => {
            let request = OneShotRequest {
                name,
                args: parse_args(&args)?,
            };
            request.validate(&registry)?;

            let ctx = TaskContext::new(store, TaskOrigin::OneShot);
            let Some(handle) =
                Dispatcher::new(registry).apply_task(ctx, &request.name, request.args)
            else {
                bail!("task {} is not registered", request.name);
            };
            // The process would abandon a detached task on exit, so wait here.
            let result = handle.await.context("task panicked")??;
            println!("{result}");
        }
        TaskCommand::List { offset, limit } => {
            let (total, page) = store.list_executions(offset, limit)?;
            println!("{total} execution(s)");
            for exec in page {
                println!(
                    "{:>5}  {:<16}  {}  {:>8}  args={}  result={}",
                    exec.id,
                    exec.name,
                    exec.started_at,
                    exec.duration_ms
                        .map(|ms| format!("{ms}ms"))
                        .unwrap_or_else(|| "-".to_string()),
                    exec.args,
                    exec.result.as_deref().unwrap_or("-")
                );
            }
        }
        TaskCommand::Names => {
            for name in registry.names() {
                println!("{name}");
            }
        }
    }
    Ok(())
}

/// Parse `--args` into positional values; must be a JSON array.
fn parse_args(raw: &str) -> Result<Vec<Value>> {
    serde_json::from_str(raw).with_context(|| format!("--args must be a JSON array, got {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_args_accepts_arrays_only() {
        assert_eq!(parse_args("[10, \"x\"]").unwrap(), vec![json!(10), json!("x")]);
        assert!(parse_args("[]").unwrap().is_empty());
        assert!(parse_args("{\"n\": 1}").is_err());
        assert!(parse_args("10").is_err());
    }
}
