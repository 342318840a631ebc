use crate::error::ApiError;
use calc_queue_client::{ClientConfig, TaskQueueClient};
use calc_queue_core::{JobRequest, ResponseEnvelope, TaskHandle, TaskId, TaskKind, TaskSnapshot};
use tracing::{debug, info};

/// Submits jobs, waits on them and turns task state into response envelopes
pub struct Orchestrator {
    client: TaskQueueClient,
}

impl Orchestrator {
    pub fn new(config: ClientConfig) -> Self {
        Orchestrator {
            client: TaskQueueClient::new(config),
        }
    }

    /// Submit a job and wait up to `request.wait` seconds for it.
    ///
    /// Whatever state the task reached is returned; running out of time is
    /// not an error.
    pub async fn submit_and_wait(
        &self,
        request: JobRequest,
        kind: TaskKind,
        base_url: &str,
    ) -> Result<ResponseEnvelope, ApiError> {
        let handle = self.client.submit(kind, request.args()).await?;
        info!("Accepted {} task {}", kind, handle.id);

        let waited = self.client.await_state(&handle, request.wait_timeout()).await?;
        if waited.timed_out {
            debug!(
                "Task {} still {} after waiting {:?}",
                handle.id,
                waited.snapshot.state,
                request.wait_timeout()
            );
        }

        Ok(ResponseEnvelope::normalize(&waited.snapshot, base_url))
    }

    /// Full envelope for a task's current state
    pub async fn status(&self, task_id: TaskId, base_url: &str) -> Result<ResponseEnvelope, ApiError> {
        let snapshot = self.snapshot(task_id).await?;
        Ok(ResponseEnvelope::normalize(&snapshot, base_url))
    }

    /// Result-only envelope for a task
    pub async fn result(&self, task_id: TaskId) -> Result<ResponseEnvelope, ApiError> {
        let snapshot = self.snapshot(task_id).await?;
        Ok(ResponseEnvelope::result_only(&snapshot))
    }

    async fn snapshot(&self, task_id: TaskId) -> Result<TaskSnapshot, ApiError> {
        // The kind is not needed for a status lookup
        let handle = TaskHandle {
            id: task_id,
            kind: TaskKind::Simple,
        };
        Ok(self.client.poll(&handle).await?)
    }
}
