//! Async client for submitting calculation tasks and reading their state.

mod client;

pub use client::{ClientConfig, TaskQueueClient, WaitOutcome};

use calc_queue_core::TaskState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Task result not ready, task is {0}")]
    NotReady(TaskState),
}

pub type Result<T> = std::result::Result<T, ClientError>;
