use crate::{config::WorkerConfig, executor::TaskExecutor, handler::TaskHandlerRegistry};
use calc_queue_core::{ErrorDetail, TaskId, TaskOutcome, TaskRecord};
use calc_queue_protocol::{ClaimTaskRequest, Message, MessageCodec, TaskResultRequest};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Upper bound on the pause between attempts to report a result
const MAX_REPORT_BACKOFF: Duration = Duration::from_secs(30);

/// Worker process that claims tasks from the broker and runs them
#[derive(Clone)]
pub struct Worker {
    config: Arc<WorkerConfig>,
    worker_id: String,
    registry: Arc<TaskHandlerRegistry>,
    slots: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(config: WorkerConfig, registry: TaskHandlerRegistry) -> Self {
        let worker_id = config.generate_worker_id();
        let concurrency = config.concurrency.max(1);

        Worker {
            config: Arc::new(config),
            worker_id,
            registry: Arc::new(registry),
            slots: Arc::new(Semaphore::new(concurrency)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until shutdown, reconnecting whenever the broker goes away
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            "Starting worker {} (concurrency: {})",
            self.worker_id,
            self.concurrency()
        );

        while !self.shutdown.is_cancelled() {
            if let Err(e) = self.claim_loop().await {
                warn!("Lost broker connection: {}", e);
                self.pause(self.config.reconnect_delay()).await;
            }
        }

        info!("Worker shutting down gracefully");
        self.graceful_shutdown().await;
        Ok(())
    }

    /// Claim tasks over one connection while there is capacity.
    ///
    /// Returns `Ok` once shutdown is requested. Shutdown is only observed
    /// between claims: a claim that was sent always has its reply read, so a
    /// task the broker has marked started is never abandoned.
    async fn claim_loop(&self) -> anyhow::Result<()> {
        let stream = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(()),
            stream = TcpStream::connect(&self.config.broker_address) => stream?,
        };
        info!("Connected to broker at {}", self.config.broker_address);

        let mut framed = Framed::new(stream, MessageCodec);

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                permit = self.slots.clone().acquire_owned() => permit?,
            };

            let claim = Message::ClaimTask(ClaimTaskRequest {
                worker_id: self.worker_id.clone(),
            });
            framed.send(claim).await?;

            match framed.next().await {
                Some(Ok(Message::Ack(ack))) => match ack.task {
                    Some(task) => {
                        let worker = self.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            worker.execute_task(task).await;
                        });
                    }
                    None => {
                        drop(permit);
                        self.pause(self.config.poll_interval()).await;
                    }
                },
                Some(Ok(Message::Nack(nack))) => {
                    debug!("Claim rejected: {}", nack.error);
                    drop(permit);
                    self.pause(self.config.poll_interval()).await;
                }
                Some(Ok(other)) => {
                    anyhow::bail!("Unexpected reply to claim: {:?}", other.message_type());
                }
                Some(Err(e)) => return Err(e.into()),
                None => anyhow::bail!("Connection closed by broker"),
            }
        }
    }

    /// Sleep for `delay`, cut short by shutdown
    async fn pause(&self, delay: Duration) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    async fn execute_task(&self, task: TaskRecord) {
        let task_id = task.id;

        let outcome = match self.registry.get(task.kind) {
            Some(handler) => {
                TaskExecutor::new(handler)
                    .with_time_limit(self.config.task_timeout())
                    .execute(&task)
                    .await
            }
            None => {
                error!("No handler registered for task kind: {}", task.kind);
                Err(ErrorDetail::new(
                    "UnknownTaskKind",
                    format!("No handler for task kind: {}", task.kind),
                ))
            }
        };

        self.report_result(task_id, outcome).await;
    }

    /// Report a result until the broker answers, backing off between attempts.
    ///
    /// The broker holds the task as started until it hears back, so giving up
    /// would leave it there for good.
    async fn report_result(&self, task_id: TaskId, outcome: TaskOutcome) {
        let mut delay = self.config.reconnect_delay();

        loop {
            match self.send_result(task_id, outcome.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        "Failed to report result of task {}: {}, retrying in {:?}",
                        task_id, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2).min(MAX_REPORT_BACKOFF);
                }
            }
        }
    }

    /// Report a finished task on its own connection
    async fn send_result(&self, task_id: TaskId, outcome: TaskOutcome) -> anyhow::Result<()> {
        let stream = TcpStream::connect(&self.config.broker_address).await?;
        let mut framed = Framed::new(stream, MessageCodec);

        let message = Message::TaskResult(TaskResultRequest {
            task_id,
            worker_id: self.worker_id.clone(),
            outcome,
        });
        framed.send(message).await?;

        match framed.next().await {
            Some(Ok(Message::Ack(_))) => {
                debug!("Result of task {} acknowledged", task_id);
                Ok(())
            }
            Some(Ok(Message::Nack(nack))) => {
                warn!("Broker rejected result of task {}: {}", task_id, nack.error);
                Ok(())
            }
            Some(Ok(other)) => anyhow::bail!("Unexpected reply to result: {:?}", other.message_type()),
            Some(Err(e)) => Err(e.into()),
            None => anyhow::bail!("Connection closed before result was acknowledged"),
        }
    }

    fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Wait for running tasks to finish, up to the configured deadline
    async fn graceful_shutdown(&self) {
        info!("Waiting for active tasks to complete...");

        let all_slots = self.concurrency() as u32;
        let deadline = Duration::from_secs(self.config.graceful_shutdown_timeout_secs);

        match tokio::time::timeout(deadline, self.slots.acquire_many(all_slots)).await {
            Ok(_) => info!("All tasks completed, shutting down"),
            Err(_) => {
                let active = self.concurrency() - self.slots.available_permits();
                warn!("Shutdown deadline exceeded, {} tasks still active", active);
            }
        }
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
