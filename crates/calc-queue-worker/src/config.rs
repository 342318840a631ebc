use crate::fanout::FanOutConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub broker_address: String,
    pub worker_id: Option<String>,
    /// Tasks run at the same time by this worker
    pub concurrency: usize,
    /// Pause between claims while the queue is empty
    pub poll_interval_ms: u64,
    /// Delay before reconnecting after the broker connection drops
    pub reconnect_delay_ms: u64,
    /// Threads for the parallel task's operations; defaults to the CPU count
    pub fanout_pool_size: Option<usize>,
    /// Hard limit on a single task's run time
    pub task_timeout_secs: Option<u64>,
    pub graceful_shutdown_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            broker_address: "127.0.0.1:6380".to_string(),
            worker_id: None,
            concurrency: 4,
            poll_interval_ms: 100,
            reconnect_delay_ms: 1000,
            fanout_pool_size: None,
            task_timeout_secs: None,
            graceful_shutdown_timeout_secs: 60,
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn generate_worker_id(&self) -> String {
        use std::process;
        use uuid::Uuid;

        if let Some(id) = &self.worker_id {
            return id.clone();
        }

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let pid = process::id();
        let random = Uuid::new_v4().simple().to_string();

        format!("{}-{}-{}", hostname, pid, &random[..8])
    }

    pub fn fanout(&self) -> FanOutConfig {
        match self.fanout_pool_size {
            Some(pool_size) => FanOutConfig { pool_size },
            None => FanOutConfig::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}
