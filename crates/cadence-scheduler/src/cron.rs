//! Time-driven execution engine behind the [`CronEngine`] seam.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use cron::Schedule;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::error::{Result, SchedulerError};

/// Opaque handle for a scheduled callback. Never reused.
pub type EntryId = u64;

/// Future returned by a firing callback.
pub type CronFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Callback invoked every time its schedule matches wall-clock time.
pub type CronJob = Arc<dyn Fn() -> CronFuture + Send + Sync>;

/// Upper bound on how long the loop sleeps with nothing scheduled.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Anything that can fire callbacks on cron schedules.
#[async_trait]
pub trait CronEngine: Send + Sync {
    /// Register `job` under `expr`. Fails on an unparseable expression.
    fn schedule(&self, expr: &str, job: CronJob) -> Result<EntryId>;

    /// Remove a previously scheduled job. Unknown IDs are ignored.
    fn unschedule(&self, id: EntryId);

    /// Drive the schedule. Never returns.
    async fn run(&self);
}

/// Normalize a standard 5-field cron expression to the `cron` crate's 6-field
/// form: prepend "0 " for seconds and renumber day-of-week.
///
/// The `cron` crate requires `sec min hour dom mon dow [year]` with Sunday=1;
/// users write standard `min hour dom mon dow` with Sunday=0 (or 7).
/// 6- and 7-field expressions and `@` descriptors pass through unchanged.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    match fields.as_slice() {
        [min, hour, dom, mon, dow] => {
            format!("0 {min} {hour} {dom} {mon} {}", normalize_day_of_week(dow))
        }
        _ => trimmed.to_string(),
    }
}

/// Rewrite numeric day-of-week items (0-7, Sunday=0/7) as an explicit 1-7
/// list. Named days and anything unrecognised are left for the parser.
fn normalize_day_of_week(field: &str) -> String {
    let mut days: Vec<u8> = Vec::new();
    let mut passthrough: Vec<&str> = Vec::new();

    for item in field.split(',') {
        match standard_days(item) {
            Some(values) => days.extend(values.into_iter().map(|d| d % 7 + 1)),
            None => passthrough.push(item),
        }
    }
    if days.is_empty() {
        return field.to_string();
    }

    days.sort_unstable();
    days.dedup();
    let mut items: Vec<String> = days.iter().map(u8::to_string).collect();
    items.extend(passthrough.into_iter().map(str::to_string));
    items.join(",")
}

/// Expand one standard day-of-week item (`3`, `1-5`, `*/2`, `1-5/2`, `2/3`)
/// into its values in 0-7. `None` for `*`, `?`, names and out-of-range input.
fn standard_days(item: &str) -> Option<Vec<u8>> {
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => (base, step.parse::<usize>().ok().filter(|s| *s > 0)?),
        None => (item, 1),
    };
    let (start, end) = match base {
        "*" if step > 1 => (0, 6),
        "*" | "?" => return None,
        _ => match base.split_once('-') {
            Some((a, b)) => (a.parse::<u8>().ok()?, b.parse::<u8>().ok()?),
            // `a/n` means every n-th day from a to the end of the week.
            None if step > 1 => (base.parse::<u8>().ok()?, 6),
            None => {
                let day = base.parse::<u8>().ok()?;
                (day, day)
            }
        },
    };
    if start > end || end > 7 {
        return None;
    }
    Some((start..=end).step_by(step).collect())
}

/// Parse a 5-, 6- or 7-field cron expression.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    Schedule::from_str(&normalize_cron(expr)).map_err(|e| SchedulerError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a standard 5-field expression or an `@` descriptor (`@daily`),
/// rejecting the seconds/year extensions [`parse_cron`] accepts.
pub fn parse_standard_cron(expr: &str) -> Result<Schedule> {
    let trimmed = expr.trim();
    let fields = trimmed.split_whitespace().count();
    if !(fields == 5 || (fields == 1 && trimmed.starts_with('@'))) {
        return Err(SchedulerError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("expected 5 fields (min hour dom mon dow), got {fields}"),
        });
    }
    parse_cron(expr)
}

struct Entry {
    expr: String,
    schedule: Schedule,
    job: CronJob,
    next: Option<DateTime<Local>>,
    /// Held for the duration of one firing so the same entry never overlaps itself.
    gate: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Default)]
struct State {
    entries: BTreeMap<EntryId, Entry>,
    next_id: EntryId,
}

/// Tokio-based [`CronEngine`] evaluating schedules in local time.
///
/// A single loop sleeps until the earliest next fire time (or until an entry
/// is added/removed), then spawns every due job on its own task.
pub struct TokioCron {
    state: Mutex<State>,
    wake: Notify,
}

impl TokioCron {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                entries: BTreeMap::new(),
                next_id: 1,
            }),
            wake: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of scheduled entries.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.state().entries.contains_key(&id)
    }

    /// Next planned firing of `id`, if scheduled.
    pub fn next_fire(&self, id: EntryId) -> Option<DateTime<Local>> {
        self.state().entries.get(&id).and_then(|e| e.next)
    }

    /// Plan every entry's next firing from `now`, so entries scheduled before
    /// the loop started do not fire a catch-up run.
    fn rearm(&self, now: DateTime<Local>) {
        for entry in self.state().entries.values_mut() {
            entry.next = entry.schedule.after(&now).next();
        }
    }

    /// Collect jobs due at `now`, advance their next fire time, and return the
    /// earliest upcoming fire time across all entries.
    fn take_due(
        &self,
        now: DateTime<Local>,
    ) -> (Vec<(EntryId, CronJob, Arc<tokio::sync::Mutex<()>>)>, Option<DateTime<Local>>) {
        let mut state = self.state();
        let mut due = Vec::new();
        let mut earliest: Option<DateTime<Local>> = None;

        for (id, entry) in state.entries.iter_mut() {
            if entry.next.is_some_and(|at| at <= now) {
                due.push((*id, Arc::clone(&entry.job), Arc::clone(&entry.gate)));
                entry.next = entry.schedule.after(&now).next();
            }
            if let Some(at) = entry.next {
                earliest = Some(earliest.map_or(at, |e| e.min(at)));
            }
        }
        (due, earliest)
    }
}

impl Default for TokioCron {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CronEngine for TokioCron {
    fn schedule(&self, expr: &str, job: CronJob) -> Result<EntryId> {
        let schedule = parse_cron(expr)?;
        let next = schedule.after(&Local::now()).next();

        let id = {
            let mut state = self.state();
            let id = state.next_id;
            state.next_id += 1;
            state.entries.insert(
                id,
                Entry {
                    expr: expr.to_string(),
                    schedule,
                    job,
                    next,
                    gate: Arc::new(tokio::sync::Mutex::new(())),
                },
            );
            id
        };
        debug!(entry_id = id, cron = %expr, next = ?next, "cron entry scheduled");
        self.wake.notify_one();
        Ok(id)
    }

    fn unschedule(&self, id: EntryId) {
        let removed = self.state().entries.remove(&id);
        if let Some(entry) = removed {
            debug!(entry_id = id, cron = %entry.expr, "cron entry removed");
            self.wake.notify_one();
        }
    }

    async fn run(&self) {
        self.rearm(Local::now());
        info!(entries = self.len(), "cron engine started");
        loop {
            let (due, earliest) = self.take_due(Local::now());

            for (id, job, gate) in due {
                tokio::spawn(async move {
                    let _firing = gate.lock().await;
                    debug!(entry_id = id, "cron entry firing");
                    job().await;
                });
            }

            let wait = earliest
                .map(|at| (at - Local::now()).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(IDLE_WAIT)
                .min(IDLE_WAIT);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wake.notified() => {}
            }
        }
    }
}
