use crate::{config::BrokerConfig, metrics::BrokerMetrics, queue::TaskQueue};
use calc_queue_backend::{open_backend, BackendError, ResultBackend};
use calc_queue_core::{TaskRecord, TaskState};
use calc_queue_protocol::{
    ClaimTaskRequest, Message, MessageCodec, QueryStatusRequest, SubmitTaskRequest,
    TaskResultRequest,
};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::codec::Framed;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Broker server: owns the pending queue and is the only writer of the
/// result backend.
pub struct Broker {
    config: Arc<BrokerConfig>,
    queue: Arc<TaskQueue>,
    backend: Arc<dyn ResultBackend>,
    metrics: Arc<BrokerMetrics>,
    shutdown: Arc<Notify>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> anyhow::Result<Self> {
        let backend = open_backend(&config.backend)?;
        Self::with_backend(config, backend)
    }

    /// Build a broker over an already opened backend, re-queueing whatever
    /// it still holds as pending.
    pub fn with_backend(config: BrokerConfig, backend: Arc<dyn ResultBackend>) -> anyhow::Result<Self> {
        let queue = TaskQueue::new();
        let pending = backend.records_in_state(TaskState::Pending)?;
        info!(
            "Loading {} pending tasks from {} backend",
            pending.len(),
            backend.name()
        );
        for record in &pending {
            queue.push(record.id);
        }

        let started = backend.count_in_state(TaskState::Started)?;
        if started > 0 {
            warn!("{} tasks were running when the broker stopped; they stay STARTED", started);
        }

        let metrics = BrokerMetrics::new()?;
        metrics.tasks_pending.set(pending.len() as i64);
        metrics.tasks_started.set(started as i64);
        metrics.queue_depth.set(queue.len() as i64);

        Ok(Broker {
            config: Arc::new(config),
            queue: Arc::new(queue),
            backend,
            metrics: Arc::new(metrics),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr = self.config.listen_address();
        let listener = TcpListener::bind(&addr).await?;
        info!("Broker listening on {}", addr);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        let broker = self.clone();
        tokio::spawn(async move {
            broker.background_tasks().await;
        });

        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
                            let broker = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = broker.handle_connection(stream).await {
                                    error!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutting down broker");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream) -> anyhow::Result<()> {
        let mut framed = Framed::new(stream, MessageCodec);

        while let Some(result) = framed.next().await {
            match result {
                Ok(message) => {
                    let response = self.handle_message(message);
                    framed.send(response).await?;
                }
                Err(e) => {
                    error!("Protocol error: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle one protocol message and produce the reply
    pub fn handle_message(&self, message: Message) -> Message {
        match message {
            Message::SubmitTask(req) => self.handle_submit_task(req),
            Message::ClaimTask(req) => self.handle_claim_task(req),
            Message::TaskResult(req) => self.handle_task_result(req),
            Message::QueryStatus(req) => self.handle_query_status(req),
            _ => Message::nack("Unsupported message type"),
        }
    }

    fn handle_submit_task(&self, req: SubmitTaskRequest) -> Message {
        let handle = req.handle;

        if self.queue.len() >= self.config.broker.queue_depth_threshold {
            warn!("Queue depth threshold exceeded, rejecting task {}", handle.id);
            return Message::nack("Queue depth threshold exceeded");
        }

        match self.backend.insert(TaskRecord::new(handle, req.args)) {
            Ok(()) => {
                self.queue.push(handle.id);

                self.metrics.inc_tasks_total(TaskState::Pending.as_str(), handle.kind.as_str());
                self.metrics.tasks_pending.inc();
                self.metrics.queue_depth.set(self.queue.len() as i64);

                info!("Submitted {} task {}", handle.kind, handle.id);
                Message::ack_with_message(format!("Task {} submitted", handle.id))
            }
            Err(e) => {
                error!("Failed to submit task {}: {}", handle.id, e);
                Message::nack(format!("Failed to submit task: {}", e))
            }
        }
    }

    fn handle_claim_task(&self, req: ClaimTaskRequest) -> Message {
        let worker_id = req.worker_id;

        while let Some(task_id) = self.queue.pop() {
            self.metrics.queue_depth.set(self.queue.len() as i64);

            match self
                .backend
                .update(&task_id, &mut |record| record.start(worker_id.clone()))
            {
                Ok(record) => {
                    self.metrics.tasks_pending.dec();
                    self.metrics.tasks_started.inc();
                    self.metrics
                        .inc_tasks_total(TaskState::Started.as_str(), record.kind.as_str());

                    debug!("Worker {} claimed task {}", worker_id, task_id);
                    return Message::ack_with_task(record);
                }
                // Queued id whose record is gone or already moved on; skip it
                Err(e @ (BackendError::TaskNotFound(_) | BackendError::TaskError(_))) => {
                    warn!("Dropping stale queue entry {}: {}", task_id, e);
                }
                Err(e) => {
                    error!("Failed to claim task {}: {}", task_id, e);
                    self.queue.push(task_id);
                    return Message::nack(format!("Failed to claim task: {}", e));
                }
            }
        }

        Message::ack_with_message("No tasks available")
    }

    fn handle_task_result(&self, req: TaskResultRequest) -> Message {
        let task_id = req.task_id;
        let mut outcome = Some(req.outcome);
        let mut previous = None;

        let result = self.backend.update(&task_id, &mut |record| match outcome.take() {
            Some(outcome) => {
                previous = Some(record.state);
                record.finish(outcome)
            }
            None => Ok(()),
        });

        match result {
            Ok(record) => {
                let kind = record.kind.as_str();
                // A result may arrive for a task that was never claimed
                match previous {
                    Some(TaskState::Pending) => self.metrics.tasks_pending.dec(),
                    _ => self.metrics.tasks_started.dec(),
                }
                self.metrics.inc_tasks_total(record.state.as_str(), kind);
                if let Some(secs) = record.run_seconds() {
                    self.metrics.observe_run_duration(kind, secs);
                }

                match record.state {
                    TaskState::Success => info!("Task {} succeeded on worker {}", task_id, req.worker_id),
                    _ => warn!("Task {} failed on worker {}", task_id, req.worker_id),
                }
                Message::ack_with_message("Result recorded")
            }
            Err(e) => {
                warn!("Rejected result for task {} from worker {}: {}", task_id, req.worker_id, e);
                Message::nack(format!("Failed to record result: {}", e))
            }
        }
    }

    fn handle_query_status(&self, req: QueryStatusRequest) -> Message {
        match self.backend.get(&req.task_id) {
            Ok(Some(record)) => Message::ack_with_task(record),
            Ok(None) => Message::ack(),
            Err(e) => {
                error!("Error querying task {}: {}", req.task_id, e);
                Message::nack(format!("Error querying task: {}", e))
            }
        }
    }

    async fn background_tasks(&self) {
        let period = Duration::from_secs(self.config.broker.cleanup_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.purge_expired_results();
                }
                _ = &mut shutdown => {
                    break;
                }
            }
        }
    }

    /// Drop finished results older than the retention window
    fn purge_expired_results(&self) {
        let retention = chrono::Duration::seconds(self.config.backend.result_retention_secs as i64);
        match self.backend.purge_finished_before(Utc::now() - retention) {
            Ok(0) => {}
            Ok(count) => info!("Expired {} task results", count),
            Err(e) => error!("Failed to purge expired results: {}", e),
        }
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        self.metrics.clone()
    }

    pub fn backend(&self) -> Arc<dyn ResultBackend> {
        self.backend.clone()
    }

    pub fn queue(&self) -> Arc<TaskQueue> {
        self.queue.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}
