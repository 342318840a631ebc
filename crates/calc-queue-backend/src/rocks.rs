use crate::{BackendError, ResultBackend, Result, Transition};
use calc_queue_core::{TaskId, TaskRecord, TaskState};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::{debug, info};

/// Column family names, one per stored state
const CF_PENDING: &str = "pending";
const CF_STARTED: &str = "started";
const CF_SUCCESS: &str = "success";
const CF_FAILURE: &str = "failure";

const ALL_CFS: [&str; 4] = [CF_PENDING, CF_STARTED, CF_SUCCESS, CF_FAILURE];

fn cf_name(state: TaskState) -> Option<&'static str> {
    match state {
        TaskState::Pending => Some(CF_PENDING),
        TaskState::Started => Some(CF_STARTED),
        TaskState::Success => Some(CF_SUCCESS),
        TaskState::Failure => Some(CF_FAILURE),
        TaskState::Unknown => None,
    }
}

/// Durable backend using RocksDB
pub struct RocksBackend {
    db: DB,
    // Serializes read-modify-write cycles; readers never take it
    write_lock: Mutex<()>,
}

impl RocksBackend {
    /// Open or create the store under `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, data_dir.join("results"), cf_descriptors)?;

        info!("Opened result backend at {:?}", data_dir);

        Ok(RocksBackend {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| BackendError::Other(format!("CF {} not found", name)))
    }

    fn cf_for(&self, state: TaskState) -> Result<&ColumnFamily> {
        let name = cf_name(state)
            .ok_or_else(|| BackendError::Other(format!("State {} is not stored", state)))?;
        self.cf(name)
    }

    fn read_all(&self, cf_name: &str) -> Result<Vec<TaskRecord>> {
        let cf = self.cf(cf_name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(TaskRecord::from_bytes(&value)?);
        }
        Ok(records)
    }
}

impl ResultBackend for RocksBackend {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    fn insert(&self, record: TaskRecord) -> Result<()> {
        let _guard = self.write_lock.lock();

        if self.get(&record.id)?.is_some() {
            return Err(BackendError::TaskAlreadyExists(record.id));
        }

        let cf = self.cf_for(record.state)?;
        self.db.put_cf(cf, record.id.as_bytes(), record.to_bytes()?)?;

        debug!("Stored task {}", record.id);
        Ok(())
    }

    fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>> {
        let key = task_id.as_bytes();

        for name in ALL_CFS {
            if let Some(value) = self.db.get_cf(self.cf(name)?, key)? {
                return Ok(Some(TaskRecord::from_bytes(&value)?));
            }
        }

        Ok(None)
    }

    fn update(&self, task_id: &TaskId, transition: Transition<'_>) -> Result<TaskRecord> {
        let _guard = self.write_lock.lock();

        let mut record = self
            .get(task_id)?
            .ok_or(BackendError::TaskNotFound(*task_id))?;
        let previous = record.state;

        transition(&mut record)?;

        let key = task_id.as_bytes();
        let mut batch = WriteBatch::default();
        if previous != record.state {
            batch.delete_cf(self.cf_for(previous)?, key);
        }
        batch.put_cf(self.cf_for(record.state)?, key, record.to_bytes()?);
        self.db.write(batch)?;

        debug!("Task {} moved {} -> {}", task_id, previous, record.state);
        Ok(record)
    }

    fn records_in_state(&self, state: TaskState) -> Result<Vec<TaskRecord>> {
        let Some(name) = cf_name(state) else {
            return Ok(Vec::new());
        };
        let mut records = self.read_all(name)?;
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock();

        let mut batch = WriteBatch::default();
        let mut count = 0;

        for name in [CF_SUCCESS, CF_FAILURE] {
            let cf = self.cf(name)?;
            for record in self.read_all(name)? {
                if record.completed_at.is_some_and(|done| done < cutoff) {
                    batch.delete_cf(cf, record.id.as_bytes());
                    count += 1;
                }
            }
        }

        if count > 0 {
            self.db.write(batch)?;
            info!("Purged {} expired task results", count);
        }

        Ok(count)
    }
}
