use crate::executor::panic_detail;
use crate::fanout::{FanOutConfig, FanOutCoordinator};
use async_trait::async_trait;
use calc_queue_core::{execute, JobArgs, OpKind, TaskKind, TaskOutcome, TaskOutput};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Trait for task handlers
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task with the given arguments
    async fn execute(&self, args: JobArgs) -> TaskOutcome;
}

/// Registry of task handlers by task kind
pub struct TaskHandlerRegistry {
    handlers: Arc<RwLock<HashMap<TaskKind, Arc<dyn TaskHandler>>>>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        TaskHandlerRegistry {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry with the simple and parallel handlers installed
    pub fn with_defaults(fanout: FanOutConfig) -> Self {
        let registry = Self::new();
        registry.register(TaskKind::Simple, SimpleTaskHandler);
        registry.register(TaskKind::Parallel, ParallelTaskHandler::new(fanout));
        registry
    }

    pub fn register<H: TaskHandler + 'static>(&self, kind: TaskKind, handler: H) {
        self.handlers.write().insert(kind, Arc::new(handler));
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().get(&kind).cloned()
    }

    pub fn has_handler(&self, kind: TaskKind) -> bool {
        self.handlers.read().contains_key(&kind)
    }

    pub fn task_kinds(&self) -> Vec<TaskKind> {
        self.handlers.read().keys().copied().collect()
    }
}

impl Default for TaskHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Adds `a` and `b` after the requested delay
pub struct SimpleTaskHandler;

#[async_trait]
impl TaskHandler for SimpleTaskHandler {
    async fn execute(&self, args: JobArgs) -> TaskOutcome {
        let value = tokio::task::spawn_blocking(move || {
            execute(OpKind::Add, args.a, args.b, args.duration())
        })
        .await
        .map_err(panic_detail)??;

        // Completion hook point; nothing is delivered from here
        info!("Simple task finished with result {}", value);
        Ok(TaskOutput::Value(value))
    }
}

/// Runs all operations through the fan-out coordinator
pub struct ParallelTaskHandler {
    coordinator: FanOutCoordinator,
}

impl ParallelTaskHandler {
    pub fn new(config: FanOutConfig) -> Self {
        ParallelTaskHandler {
            coordinator: FanOutCoordinator::new(config),
        }
    }
}

#[async_trait]
impl TaskHandler for ParallelTaskHandler {
    async fn execute(&self, args: JobArgs) -> TaskOutcome {
        let results = self
            .coordinator
            .run_parallel(args.a, args.b, args.duration())
            .await?;
        Ok(TaskOutput::Operations(results))
    }
}
