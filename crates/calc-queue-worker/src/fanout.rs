//! Runs every arithmetic operation on the same operands concurrently.

use crate::executor::panic_detail;
use calc_queue_core::{execute, ComputationError, ErrorDetail, OpKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

type OpFn = fn(OpKind, f64, f64, Duration) -> Result<f64, ComputationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutConfig {
    /// Maximum number of operations running at once
    pub pool_size: usize,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        let pool_size = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        FanOutConfig { pool_size }
    }
}

/// Owns its own bounded pool, separate from the worker's task concurrency
pub struct FanOutCoordinator {
    permits: Arc<Semaphore>,
    pool_size: usize,
}

impl FanOutCoordinator {
    pub fn new(config: FanOutConfig) -> Self {
        let pool_size = config.pool_size.max(1);
        FanOutCoordinator {
            permits: Arc::new(Semaphore::new(pool_size)),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Run all seven operations on `(a, b)` and collect their results.
    ///
    /// Waits for every operation. If any fails, the error of the first failing
    /// operation in declaration order is returned and no results are kept.
    pub async fn run_parallel(
        &self,
        a: f64,
        b: f64,
        duration: Duration,
    ) -> Result<BTreeMap<OpKind, f64>, ErrorDetail> {
        self.run_with(execute, a, b, duration).await
    }

    async fn run_with(
        &self,
        op_fn: OpFn,
        a: f64,
        b: f64,
        duration: Duration,
    ) -> Result<BTreeMap<OpKind, f64>, ErrorDetail> {
        let mut running = Vec::with_capacity(OpKind::ALL.len());

        for op in OpKind::ALL {
            // The semaphore is never closed
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ErrorDetail::new("PoolClosed", e.to_string()).with_operation(op))?;

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                op_fn(op, a, b, duration)
            });
            running.push((op, handle));
        }

        let mut results = BTreeMap::new();
        let mut first_error: Option<ErrorDetail> = None;

        for (op, handle) in running {
            match handle.await {
                Ok(Ok(value)) => {
                    results.insert(op, value);
                }
                Ok(Err(e)) => {
                    debug!("Operation {} failed: {}", op, e);
                    first_error.get_or_insert_with(|| e.into());
                }
                Err(e) => {
                    first_error.get_or_insert_with(|| panic_detail(e).with_operation(op));
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(results),
        }
    }
}

impl Default for FanOutCoordinator {
    fn default() -> Self {
        Self::new(FanOutConfig::default())
    }
}
