use calc_queue_core::{JobArgs, TaskHandle, TaskId, TaskOutcome, TaskRecord};
use serde::{Deserialize, Serialize};

/// Message types for the broker TCP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    SubmitTask = 1,
    ClaimTask = 2,
    TaskResult = 3,
    Ack = 4,
    Nack = 5,
    QueryStatus = 6,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::SubmitTask),
            2 => Some(MessageType::ClaimTask),
            3 => Some(MessageType::TaskResult),
            4 => Some(MessageType::Ack),
            5 => Some(MessageType::Nack),
            6 => Some(MessageType::QueryStatus),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Enqueue a new task
    SubmitTask(SubmitTaskRequest),

    /// Worker asks for the next pending task
    ClaimTask(ClaimTaskRequest),

    /// Worker reports a finished task
    TaskResult(TaskResultRequest),

    /// Positive acknowledgment
    Ack(AckResponse),

    /// Negative acknowledgment
    Nack(NackResponse),

    /// Look up a task's current record
    QueryStatus(QueryStatusRequest),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::SubmitTask(_) => MessageType::SubmitTask,
            Message::ClaimTask(_) => MessageType::ClaimTask,
            Message::TaskResult(_) => MessageType::TaskResult,
            Message::Ack(_) => MessageType::Ack,
            Message::Nack(_) => MessageType::Nack,
            Message::QueryStatus(_) => MessageType::QueryStatus,
        }
    }

    pub fn ack() -> Self {
        Message::Ack(AckResponse::default())
    }

    pub fn ack_with_task(task: TaskRecord) -> Self {
        Message::Ack(AckResponse {
            task: Some(task),
            message: None,
        })
    }

    pub fn ack_with_message(message: impl Into<String>) -> Self {
        Message::Ack(AckResponse {
            task: None,
            message: Some(message.into()),
        })
    }

    pub fn nack(error: impl Into<String>) -> Self {
        Message::Nack(NackResponse {
            error: error.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    pub handle: TaskHandle,
    pub args: JobArgs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimTaskRequest {
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultRequest {
    pub task_id: TaskId,
    pub worker_id: String,
    pub outcome: TaskOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStatusRequest {
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckResponse {
    /// Task record, for ClaimTask and QueryStatus
    pub task: Option<TaskRecord>,
    /// Optional message
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NackResponse {
    pub error: String,
}
