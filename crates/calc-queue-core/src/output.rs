use crate::{ComputationError, OpKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Value produced by a successful task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskOutput {
    /// Result of a simple task
    Value(f64),
    /// One result per operation, from a parallel task
    Operations(BTreeMap<OpKind, f64>),
}

impl TaskOutput {
    /// JSON form used in response envelopes: a bare number or an
    /// object keyed by operation name.
    pub fn to_json(&self) -> Value {
        match self {
            TaskOutput::Value(value) => number(*value),
            TaskOutput::Operations(results) => Value::Object(
                results
                    .iter()
                    .map(|(op, value)| (op.as_str().to_string(), number(*value)))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Structured failure record stored for a task in the `FAILURE` state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error class, e.g. `DivisionByZero` or `Panic`
    pub classification: String,
    pub message: String,
    /// Operation that raised the error, when one did
    pub operation: Option<OpKind>,
}

impl ErrorDetail {
    pub fn new(classification: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorDetail {
            classification: classification.into(),
            message: message.into(),
            operation: None,
        }
    }

    pub fn with_operation(mut self, op: OpKind) -> Self {
        self.operation = Some(op);
        self
    }
}

impl From<ComputationError> for ErrorDetail {
    fn from(err: ComputationError) -> Self {
        ErrorDetail::new(err.classification(), err.to_string()).with_operation(err.operation())
    }
}

/// What a handler yields and what a finished task resolves to
pub type TaskOutcome = Result<TaskOutput, ErrorDetail>;
