mod task;
mod operation;
mod output;
mod envelope;
mod error;

pub use task::{JobArgs, JobRequest, TaskHandle, TaskId, TaskKind, TaskRecord, TaskSnapshot, TaskState};
pub use operation::{execute, ComputationError, OpKind};
pub use output::{ErrorDetail, TaskOutcome, TaskOutput};
pub use envelope::{ResponseEnvelope, SparseEnvelope};
pub use error::{TaskError, Result};
