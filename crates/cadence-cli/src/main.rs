use std::sync::Arc;

use anyhow::Context;
use cadence_core::CadenceConfig;
use cadence_scheduler::{SqliteTaskStore, TaskRegistry, TaskStore};
use clap::Parser;
use tracing::info;

mod cli;
mod commands;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // load config: --config > CADENCE_CONFIG env > ~/.cadence/cadence.toml
    let config =
        CadenceConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.filter.as_str().into()),
        )
        .init();

    config.ensure_database_dir()?;
    let db_path = &config.database.path;
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(db_path)
        .with_context(|| format!("failed to open database {db_path}"))?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

    let store: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::new(db)?);
    let registry = Arc::new(TaskRegistry::builtin());

    match args.command {
        Command::Scheduler => commands::run_scheduler(&config, store, registry).await,
        Command::Periodic(cmd) => commands::periodic(cmd, store.as_ref(), &registry),
        Command::Task(cmd) => commands::task(cmd, store, registry).await,
    }
}
