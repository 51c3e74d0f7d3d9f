//! `cadence-scheduler` — in-process periodic and one-shot task scheduling.
//!
//! # Overview
//!
//! Periodic task definitions live in a [`TaskStore`] (SQLite by default).
//! [`TaskScheduler::load_tasks`] reconciles them into live entries of a
//! [`CronEngine`]; each firing re-reads its definition and hands the stored
//! arguments to the [`Dispatcher`], which runs the named function from the
//! [`TaskRegistry`] on a detached blocking task.
//!
//! | Component        | Module          |
//! |------------------|-----------------|
//! | Task store       | [`store`], [`db`] |
//! | Entry map        | [`entry_map`]   |
//! | Cron engine      | [`cron`]        |
//! | Scheduler core   | [`engine`]      |
//! | Task registry    | [`registry`], [`tasks`] |
//! | Dispatcher       | [`dispatch`]    |
//!
//! Single instance only: running two schedulers against one store fires
//! every task twice. In-flight tasks are abandoned on shutdown and failed
//! runs are not retried.

pub mod cron;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod entry_map;
pub mod error;
pub mod registry;
pub mod store;
pub mod tasks;
pub mod types;
pub mod validate;

pub use self::cron::{CronEngine, TokioCron};
pub use dispatch::{Dispatcher, TaskHandle};
pub use engine::{fire, FireOutcome, TaskScheduler};
pub use entry_map::{EntryMap, ScheduleEntry};
pub use error::{Result, SchedulerError, TaskError};
pub use registry::{decode_arg, TaskContext, TaskFn, TaskRegistry};
pub use store::{SqliteTaskStore, TaskStore};
pub use types::{NewPeriodicTask, PeriodicTask, TaskExecution, TaskId, TaskOrigin};
pub use validate::{OneShotRequest, PeriodicTaskRequest};
