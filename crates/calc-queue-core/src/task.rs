use crate::{ErrorDetail, TaskError, TaskOutcome, TaskOutput, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// The closed set of task kinds a worker knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// One `add` of the two operands
    #[serde(rename = "start_simple_task")]
    Simple,
    /// All operations fanned out in parallel
    #[serde(rename = "start_parallel_task")]
    Parallel,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Simple => "start_simple_task",
            TaskKind::Parallel => "start_parallel_task",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start_simple_task" => Ok(TaskKind::Simple),
            "start_parallel_task" => Ok(TaskKind::Parallel),
            other => Err(TaskError::UnknownTaskKind(other.to_string())),
        }
    }
}

/// Lifecycle state of a task as seen by the result backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    /// Queued, not yet claimed by a worker
    Pending,
    /// Claimed by a worker and running
    Started,
    /// Finished with a result
    Success,
    /// Finished with an error
    Failure,
    /// The backend has no record of the task
    Unknown,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
            TaskState::Unknown => "UNKNOWN",
        }
    }

    /// `Success` and `Failure` are final; `Unknown` is not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        [
            TaskState::Pending,
            TaskState::Started,
            TaskState::Success,
            TaskState::Failure,
            TaskState::Unknown,
        ]
        .into_iter()
        .find(|state| state.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| TaskError::UnknownState(s.to_string()))
    }
}

/// Arguments carried from the submitter to the worker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobArgs {
    /// Simulated work time in seconds
    pub duration: u64,
    pub a: f64,
    pub b: f64,
}

impl JobArgs {
    pub fn new(duration: u64, a: f64, b: f64) -> Self {
        JobArgs { duration, a, b }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }
}

/// Body of the job submission endpoints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub duration: u64,
    pub a: f64,
    pub b: f64,
    /// Seconds to block for a result before answering; absent means until done
    #[serde(default)]
    pub wait: Option<u64>,
}

impl JobRequest {
    pub fn args(&self) -> JobArgs {
        JobArgs::new(self.duration, self.a, self.b)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait.map(Duration::from_secs)
    }
}

/// Reference to a submitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: TaskId,
    pub kind: TaskKind,
}

impl TaskHandle {
    pub fn new(kind: TaskKind) -> Self {
        TaskHandle {
            id: Uuid::new_v4(),
            kind,
        }
    }
}

/// Stored task state, owned by the result backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub args: JobArgs,
    pub state: TaskState,
    pub output: Option<TaskOutput>,
    pub error: Option<ErrorDetail>,
    /// Worker currently or last running this task
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a pending record for a freshly submitted task
    pub fn new(handle: TaskHandle, args: JobArgs) -> Self {
        TaskRecord {
            id: handle.id,
            kind: handle.kind,
            args,
            state: TaskState::Pending,
            output: None,
            error: None,
            worker_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.id,
            kind: self.kind,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(TaskError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(TaskError::from)
    }

    /// Mark the task as picked up by a worker
    pub fn start(&mut self, worker_id: String) -> Result<()> {
        self.check_transition(TaskState::Started, &[TaskState::Pending])?;
        self.state = TaskState::Started;
        self.worker_id = Some(worker_id);
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn succeed(&mut self, output: TaskOutput) -> Result<()> {
        self.check_transition(TaskState::Success, &[TaskState::Pending, TaskState::Started])?;
        self.state = TaskState::Success;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: ErrorDetail) -> Result<()> {
        self.check_transition(TaskState::Failure, &[TaskState::Pending, TaskState::Started])?;
        self.state = TaskState::Failure;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Record a handler outcome as the terminal state
    pub fn finish(&mut self, outcome: TaskOutcome) -> Result<()> {
        match outcome {
            Ok(output) => self.succeed(output),
            Err(error) => self.fail(error),
        }
    }

    /// Seconds between start and completion, if both are known
    pub fn run_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        Some((completed - started).num_milliseconds() as f64 / 1000.0)
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            state: self.state,
            output: self.output.clone(),
            error: self.error.clone(),
        }
    }

    fn check_transition(&self, to: TaskState, allowed_from: &[TaskState]) -> Result<()> {
        if allowed_from.contains(&self.state) {
            Ok(())
        } else {
            Err(TaskError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }
}

/// Point-in-time view of a task, as returned to pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub state: TaskState,
    pub output: Option<TaskOutput>,
    pub error: Option<ErrorDetail>,
}

impl TaskSnapshot {
    /// Snapshot for an id the backend has never seen or has expired
    pub fn unknown(id: TaskId) -> Self {
        TaskSnapshot {
            id,
            state: TaskState::Unknown,
            output: None,
            error: None,
        }
    }

    /// The final outcome, or `None` while the task is not terminal
    pub fn outcome(&self) -> Option<TaskOutcome> {
        match self.state {
            TaskState::Success => self.output.clone().map(Ok),
            TaskState::Failure => self.error.clone().map(Err),
            _ => None,
        }
    }
}
