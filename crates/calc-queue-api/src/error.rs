use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use calc_queue_client::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Task queue unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Task rejected by broker: {0}")]
    Rejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Connection(_) | ClientError::Protocol(_) => {
                ApiError::BackendUnavailable(err.to_string())
            }
            ClientError::Server(msg) => ApiError::Rejected(msg),
            ClientError::NotReady(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BackendUnavailable(_) | ApiError::Rejected(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
