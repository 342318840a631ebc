use crate::{ClientError, Result};
use calc_queue_core::{JobArgs, TaskHandle, TaskKind, TaskOutcome, TaskSnapshot};
use calc_queue_protocol::{Message, MessageCodec, QueryStatusRequest, SubmitTaskRequest};

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub broker_address: String,
    /// Pause between status polls while waiting for a task
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            broker_address: "127.0.0.1:6380".to_string(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Snapshot reached by [`TaskQueueClient::await_state`]
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOutcome {
    pub snapshot: TaskSnapshot,
    /// The wait ended before the task reached a terminal state
    pub timed_out: bool,
}

/// Async client for the broker. Each call uses its own connection.
#[derive(Debug, Clone)]
pub struct TaskQueueClient {
    config: ClientConfig,
}

impl TaskQueueClient {
    pub fn new(config: ClientConfig) -> Self {
        TaskQueueClient { config }
    }

    pub fn broker_address(&self) -> &str {
        &self.config.broker_address
    }

    /// Enqueue a task and return its handle once the broker has stored it
    pub async fn submit(&self, kind: TaskKind, args: JobArgs) -> Result<TaskHandle> {
        let handle = TaskHandle::new(kind);
        let message = Message::SubmitTask(SubmitTaskRequest { handle, args });

        match self.request(message).await? {
            Message::Ack(_) => {
                debug!("Submitted {} task {}", kind, handle.id);
                Ok(handle)
            }
            Message::Nack(nack) => Err(ClientError::Server(nack.error)),
            _ => Err(ClientError::Protocol("Unexpected response".to_string())),
        }
    }

    /// Current state of the task. An id the broker has no record of is `Unknown`.
    pub async fn poll(&self, handle: &TaskHandle) -> Result<TaskSnapshot> {
        let message = Message::QueryStatus(QueryStatusRequest { task_id: handle.id });

        match self.request(message).await? {
            Message::Ack(ack) => Ok(ack
                .task
                .map(|record| record.snapshot())
                .unwrap_or_else(|| TaskSnapshot::unknown(handle.id))),
            Message::Nack(nack) => Err(ClientError::Server(nack.error)),
            _ => Err(ClientError::Protocol("Unexpected response".to_string())),
        }
    }

    /// Poll until the task is finished or `timeout` elapses.
    ///
    /// `None` waits indefinitely; `Some(Duration::ZERO)` polls once. Running
    /// out of time is reported through [`WaitOutcome::timed_out`], and the task
    /// keeps running.
    pub async fn await_state(
        &self,
        handle: &TaskHandle,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        // A deadline past what the clock can represent is no deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            let snapshot = self.poll(handle).await?;
            if snapshot.state.is_terminal() {
                return Ok(WaitOutcome {
                    snapshot,
                    timed_out: false,
                });
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(WaitOutcome {
                            snapshot,
                            timed_out: true,
                        });
                    }
                    self.config.poll_interval.min(deadline - now)
                }
                None => self.config.poll_interval,
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// Final outcome of a finished task
    pub async fn fetch_result(&self, handle: &TaskHandle) -> Result<TaskOutcome> {
        let snapshot = self.poll(handle).await?;
        snapshot
            .outcome()
            .ok_or(ClientError::NotReady(snapshot.state))
    }

    /// One request/response round trip
    async fn request(&self, message: Message) -> Result<Message> {
        let stream = TcpStream::connect(&self.config.broker_address)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let mut framed = Framed::new(stream, MessageCodec);

        framed
            .send(message)
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        match framed.next().await {
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => Err(ClientError::Protocol(e.to_string())),
            None => Err(ClientError::Connection("Connection closed".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calc_queue_backend::MemoryBackend;
    use calc_queue_broker::{Broker, BrokerConfig};
    use calc_queue_core::{ErrorDetail, TaskOutput, TaskState};
    use calc_queue_protocol::{ClaimTaskRequest, TaskResultRequest};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn start_broker() -> (Arc<Broker>, TaskQueueClient) {
        let broker = Arc::new(
            Broker::with_backend(BrokerConfig::default(), Arc::new(MemoryBackend::new())).unwrap(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(broker.clone().serve(listener));

        let client = TaskQueueClient::new(ClientConfig {
            broker_address: addr.to_string(),
            poll_interval: Duration::from_millis(10),
        });
        (broker, client)
    }

    /// Play the worker's part directly against the broker
    fn complete(broker: &Broker, outcome: TaskOutcome) {
        let claimed = match broker.handle_message(Message::ClaimTask(ClaimTaskRequest {
            worker_id: "test-worker".to_string(),
        })) {
            Message::Ack(ack) => ack.task.unwrap(),
            other => panic!("Unexpected reply: {:?}", other),
        };
        let reply = broker.handle_message(Message::TaskResult(TaskResultRequest {
            task_id: claimed.id,
            worker_id: "test-worker".to_string(),
            outcome,
        }));
        assert!(matches!(reply, Message::Ack(_)));
    }

    #[tokio::test]
    async fn test_pending_task() {
        let (_broker, client) = start_broker().await;
        let handle = client
            .submit(TaskKind::Simple, JobArgs::new(0, 10.0, 2.0))
            .await
            .unwrap();

        assert_eq!(client.poll(&handle).await.unwrap().state, TaskState::Pending);
        assert!(matches!(
            client.fetch_result(&handle).await,
            Err(ClientError::NotReady(TaskState::Pending))
        ));

        let waited = client
            .await_state(&handle, Some(Duration::ZERO))
            .await
            .unwrap();
        assert!(waited.timed_out);
        assert_eq!(waited.snapshot.state, TaskState::Pending);

        let waited = client
            .await_state(&handle, Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(waited.timed_out);
    }

    #[tokio::test]
    async fn test_finished_task() {
        let (broker, client) = start_broker().await;
        let handle = client
            .submit(TaskKind::Simple, JobArgs::new(0, 10.0, 2.0))
            .await
            .unwrap();

        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.await_state(&handle, None).await })
        };
        complete(&broker, Ok(TaskOutput::Value(12.0)));

        let waited = waiter.await.unwrap().unwrap();
        assert!(!waited.timed_out);
        assert_eq!(waited.snapshot.state, TaskState::Success);

        assert_eq!(
            client.fetch_result(&handle).await.unwrap(),
            Ok(TaskOutput::Value(12.0))
        );
        // Terminal snapshots do not change between polls
        assert_eq!(
            client.poll(&handle).await.unwrap(),
            client.poll(&handle).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_wait_beyond_clock_range() {
        let (broker, client) = start_broker().await;
        let handle = client
            .submit(TaskKind::Simple, JobArgs::new(0, 10.0, 2.0))
            .await
            .unwrap();

        let waiter = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .await_state(&handle, Some(Duration::from_secs(u64::MAX)))
                    .await
            })
        };
        complete(&broker, Ok(TaskOutput::Value(12.0)));

        let waited = waiter.await.unwrap().unwrap();
        assert!(!waited.timed_out);
        assert_eq!(waited.snapshot.state, TaskState::Success);
    }

    #[tokio::test]
    async fn test_failed_task() {
        let (broker, client) = start_broker().await;
        let handle = client
            .submit(TaskKind::Parallel, JobArgs::new(0, 5.0, 0.0))
            .await
            .unwrap();

        let detail = ErrorDetail::new("DivisionByZero", "div: division by zero");
        complete(&broker, Err(detail.clone()));

        let waited = client.await_state(&handle, Some(Duration::ZERO)).await.unwrap();
        assert!(!waited.timed_out);
        assert_eq!(waited.snapshot.state, TaskState::Failure);
        assert_eq!(client.fetch_result(&handle).await.unwrap(), Err(detail));
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let (_broker, client) = start_broker().await;
        let handle = TaskHandle::new(TaskKind::Simple);

        let snapshot = client.poll(&handle).await.unwrap();
        assert_eq!(snapshot, TaskSnapshot::unknown(handle.id));

        let waited = client.await_state(&handle, Some(Duration::ZERO)).await.unwrap();
        assert!(waited.timed_out);
        assert_eq!(waited.snapshot.state, TaskState::Unknown);
    }

    #[tokio::test]
    async fn test_unreachable_broker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = TaskQueueClient::new(ClientConfig {
            broker_address: addr.to_string(),
            ..ClientConfig::default()
        });
        assert!(matches!(
            client.submit(TaskKind::Simple, JobArgs::new(0, 1.0, 1.0)).await,
            Err(ClientError::Connection(_))
        ));
    }
}
