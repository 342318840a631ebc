use crate::TaskState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("Unknown task state: {0}")]
    UnknownState(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;
