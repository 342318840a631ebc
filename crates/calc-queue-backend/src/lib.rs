//! Result backend: the single store of task state and results.
//!
//! The broker is the only writer. Every state change goes through
//! [`ResultBackend::update`], which applies a transition atomically with
//! respect to other writers of the same task.

mod memory;
mod rocks;

pub use memory::MemoryBackend;
pub use rocks::RocksBackend;

use calc_queue_core::{TaskId, TaskRecord, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),

    #[error("Task error: {0}")]
    TaskError(#[from] calc_queue_core::TaskError),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task already exists: {0}")]
    TaskAlreadyExists(TaskId),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Transition applied to a stored record
pub type Transition<'a> = &'a mut dyn FnMut(&mut TaskRecord) -> calc_queue_core::Result<()>;

/// Storage for task records, keyed by task id
pub trait ResultBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Store a new record; fails if the id is already present
    fn insert(&self, record: TaskRecord) -> Result<()>;

    fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>>;

    /// Apply `transition` to the stored record and persist the result.
    ///
    /// When the transition fails the stored record is left untouched.
    fn update(&self, task_id: &TaskId, transition: Transition<'_>) -> Result<TaskRecord>;

    /// All records currently in `state`, oldest first
    fn records_in_state(&self, state: TaskState) -> Result<Vec<TaskRecord>>;

    /// Drop terminal records completed before `cutoff`; returns how many went
    fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    fn count_in_state(&self, state: TaskState) -> Result<usize> {
        Ok(self.records_in_state(state)?.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Rocksdb,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "rocksdb" => Ok(BackendKind::Rocksdb),
            other => Err(format!("unknown backend kind: {}", other)),
        }
    }
}

/// Configuration for the result backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub data_dir: PathBuf,
    /// How long finished task records are kept
    pub result_retention_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            kind: BackendKind::Memory,
            data_dir: PathBuf::from("./data"),
            result_retention_secs: 24 * 60 * 60,
        }
    }
}

/// Open the backend described by `config`
pub fn open_backend(config: &BackendConfig) -> Result<Arc<dyn ResultBackend>> {
    match config.kind {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::Rocksdb => Ok(Arc::new(RocksBackend::open(&config.data_dir)?)),
    }
}
