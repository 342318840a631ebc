use crate::handler::TaskHandler;
use calc_queue_core::{ErrorDetail, TaskOutcome, TaskRecord};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{error, info};

/// Task executor with an optional time limit and panic recovery
pub struct TaskExecutor {
    handler: Arc<dyn TaskHandler>,
    time_limit: Option<Duration>,
}

impl TaskExecutor {
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        TaskExecutor {
            handler,
            time_limit: None,
        }
    }

    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    /// Run the task's handler. Panics and overruns come back as failures.
    pub async fn execute(&self, task: &TaskRecord) -> TaskOutcome {
        let task_id = task.id;
        let args = task.args;
        let handler = self.handler.clone();

        info!("Executing {} task {}", task.kind, task_id);

        let mut run = tokio::spawn(async move { handler.execute(args).await });

        let joined = match self.time_limit {
            Some(limit) => match tokio::time::timeout(limit, &mut run).await {
                Ok(joined) => joined,
                Err(_) => {
                    run.abort();
                    error!("Task {} exceeded its time limit of {:?}", task_id, limit);
                    return Err(ErrorDetail::new(
                        "TimeLimitExceeded",
                        format!("Task execution timed out after {:?}", limit),
                    ));
                }
            },
            None => run.await,
        };

        let outcome = joined.map_err(panic_detail).and_then(|outcome| outcome);
        match &outcome {
            Ok(_) => info!("Task {} completed successfully", task_id),
            Err(e) => error!("Task {} failed: {}: {}", task_id, e.classification, e.message),
        }
        outcome
    }
}

/// Turn a failed join into the error recorded for the task
pub(crate) fn panic_detail(err: JoinError) -> ErrorDetail {
    if err.is_panic() {
        ErrorDetail::new("Panic", panic_message(err.into_panic()))
    } else {
        ErrorDetail::new("Cancelled", "Task was cancelled")
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Task panicked during execution".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::SimpleTaskHandler;
    use async_trait::async_trait;
    use calc_queue_core::{JobArgs, TaskHandle, TaskKind, TaskOutput};

    struct PanickingHandler;

    #[async_trait]
    impl TaskHandler for PanickingHandler {
        async fn execute(&self, _args: JobArgs) -> TaskOutcome {
            panic!("handler blew up")
        }
    }

    fn record(duration: u64) -> TaskRecord {
        TaskRecord::new(TaskHandle::new(TaskKind::Simple), JobArgs::new(duration, 10.0, 2.0))
    }

    #[tokio::test]
    async fn test_executor_success() {
        let executor = TaskExecutor::new(Arc::new(SimpleTaskHandler));
        let outcome = executor.execute(&record(0)).await;
        assert_eq!(outcome, Ok(TaskOutput::Value(12.0)));
    }

    #[tokio::test]
    async fn test_executor_time_limit() {
        let executor = TaskExecutor::new(Arc::new(SimpleTaskHandler))
            .with_time_limit(Some(Duration::from_millis(100)));

        let error = executor.execute(&record(2)).await.unwrap_err();
        assert_eq!(error.classification, "TimeLimitExceeded");
    }

    #[tokio::test]
    async fn test_executor_recovers_from_panic() {
        let executor = TaskExecutor::new(Arc::new(PanickingHandler));
        let error = executor.execute(&record(0)).await.unwrap_err();

        assert_eq!(error.classification, "Panic");
        assert!(error.message.contains("handler blew up"));
    }
}
