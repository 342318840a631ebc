use crate::{ErrorDetail, TaskSnapshot, TaskState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response body returned by the HTTP surface.
///
/// Serializing the envelope directly renders every field, with `null` for
/// the unset ones. [`ResponseEnvelope::sparse`] renders only the set fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: Option<TaskState>,
    pub result: Option<Value>,
    /// The id as the caller gave it; not necessarily a valid task id
    pub task_id: Option<String>,
    pub full_traceback: Option<ErrorDetail>,
    pub url: Option<String>,
}

impl ResponseEnvelope {
    /// Build the envelope for a task's current state.
    ///
    /// `base_url` is `scheme://host[:port]/`; the polling url is
    /// `{base_url}status/{task_id}`.
    pub fn normalize(snapshot: &TaskSnapshot, base_url: &str) -> Self {
        let (result, full_traceback) = match snapshot.state {
            TaskState::Success => (snapshot.output.as_ref().map(|o| o.to_json()), None),
            TaskState::Failure => (None, snapshot.error.clone()),
            _ => (None, None),
        };

        ResponseEnvelope {
            status: Some(snapshot.state),
            result,
            task_id: Some(snapshot.id.to_string()),
            full_traceback,
            url: Some(format!("{}status/{}", base_url, snapshot.id)),
        }
    }

    /// Envelope for an id that cannot name any task, such as one that is
    /// not a UUID
    pub fn unknown(task_id: &str, base_url: &str) -> Self {
        ResponseEnvelope {
            status: Some(TaskState::Unknown),
            result: None,
            task_id: Some(task_id.to_string()),
            full_traceback: None,
            url: Some(format!("{}status/{}", base_url, task_id)),
        }
    }

    /// Envelope for the result-only endpoint: the output on success,
    /// otherwise the state name in `result`.
    pub fn result_only(snapshot: &TaskSnapshot) -> Self {
        let result = match (&snapshot.state, &snapshot.output) {
            (TaskState::Success, Some(output)) => output.to_json(),
            (state, _) => Value::String(state.as_str().to_string()),
        };

        ResponseEnvelope {
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn sparse(&self) -> SparseEnvelope<'_> {
        SparseEnvelope {
            status: self.status,
            result: self.result.as_ref(),
            task_id: self.task_id.as_deref(),
            full_traceback: self.full_traceback.as_ref(),
            url: self.url.as_deref(),
        }
    }
}

/// Borrowed view of an envelope that omits unset fields when serialized
#[derive(Debug, Serialize)]
pub struct SparseEnvelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_traceback: Option<&'a ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a str>,
}
