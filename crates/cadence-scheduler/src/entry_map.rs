use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::cron::EntryId;
use crate::types::TaskId;

/// A periodic task that is live in the cron engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub task_id: TaskId,
    /// Handle returned by the cron engine, needed to unschedule.
    pub handle: EntryId,
    /// Cached for log lines.
    pub name: String,
}

/// Task ID → live cron entry, shared between the reconcile loop and firings.
///
/// Many readers or one writer. Lock poisoning is recovered, so no operation
/// can fail.
#[derive(Debug, Default)]
pub struct EntryMap {
    mapping: RwLock<HashMap<TaskId, ScheduleEntry>>,
}

impl EntryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: TaskId) -> Option<ScheduleEntry> {
        let mapping = self.mapping.read().unwrap_or_else(PoisonError::into_inner);
        mapping.get(&task_id).cloned()
    }

    /// Insert or overwrite the entry for `task_id`.
    pub fn set(&self, task_id: TaskId, entry: ScheduleEntry) {
        let mut mapping = self.mapping.write().unwrap_or_else(PoisonError::into_inner);
        mapping.insert(task_id, entry);
    }

    pub fn delete(&self, task_id: TaskId) -> Option<ScheduleEntry> {
        let mut mapping = self.mapping.write().unwrap_or_else(PoisonError::into_inner);
        mapping.remove(&task_id)
    }

    /// Snapshot of the live task IDs; the lock is released before returning.
    pub fn task_ids(&self) -> Vec<TaskId> {
        let mapping = self.mapping.read().unwrap_or_else(PoisonError::into_inner);
        mapping.keys().copied().collect()
    }

    /// Snapshot of all entries ordered by task ID.
    pub fn entries(&self) -> Vec<ScheduleEntry> {
        let mapping = self.mapping.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = mapping.values().cloned().collect();
        entries.sort_by_key(|e| e.task_id);
        entries
    }

    pub fn len(&self) -> usize {
        self.mapping
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
