use crate::{BackendError, ResultBackend, Result, Transition};
use calc_queue_core::{TaskId, TaskRecord, TaskState};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

/// Non-durable backend; state lives as long as the broker process
#[derive(Default)]
pub struct MemoryBackend {
    records: DashMap<TaskId, TaskRecord>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn insert(&self, record: TaskRecord) -> Result<()> {
        match self.records.entry(record.id) {
            Entry::Occupied(_) => Err(BackendError::TaskAlreadyExists(record.id)),
            Entry::Vacant(slot) => {
                debug!("Stored task {}", record.id);
                slot.insert(record);
                Ok(())
            }
        }
    }

    fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>> {
        Ok(self.records.get(task_id).map(|r| r.value().clone()))
    }

    fn update(&self, task_id: &TaskId, transition: Transition<'_>) -> Result<TaskRecord> {
        // The shard lock is held for the whole read-modify-write
        let mut entry = self
            .records
            .get_mut(task_id)
            .ok_or(BackendError::TaskNotFound(*task_id))?;

        let mut updated = entry.value().clone();
        transition(&mut updated)?;
        *entry.value_mut() = updated.clone();
        Ok(updated)
    }

    fn records_in_state(&self, state: TaskState) -> Result<Vec<TaskRecord>> {
        let mut records: Vec<TaskRecord> = self
            .records
            .iter()
            .filter(|r| r.state == state)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.records.len();
        self.records.retain(|_, record| {
            !(record.state.is_terminal()
                && record.completed_at.is_some_and(|done| done < cutoff))
        });
        Ok(before - self.records.len())
    }
}
