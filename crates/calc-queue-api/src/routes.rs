use crate::{config::ApiConfig, error::ApiError, orchestrator::Orchestrator};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use calc_queue_core::{JobRequest, ResponseEnvelope, TaskKind, TaskSnapshot};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    /// Used when the request has no Host header
    fallback_base_url: String,
}

pub fn create_router(config: &ApiConfig) -> Router {
    let state = AppState {
        orchestrator: Arc::new(Orchestrator::new(config.client_config())),
        fallback_base_url: config.base_url(),
    };

    Router::new()
        .route("/start_simple_task", post(start_simple_task))
        .route("/start_parallel_task", post(start_parallel_task))
        .route("/status/:task_id", get(task_status))
        .route("/result/:task_id", get(task_result))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn start_simple_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<JobRequest>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    let base_url = base_url(&headers, &state.fallback_base_url);
    let envelope = state
        .orchestrator
        .submit_and_wait(request, TaskKind::Simple, &base_url)
        .await?;
    Ok(Json(envelope))
}

async fn start_parallel_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<JobRequest>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    let base_url = base_url(&headers, &state.fallback_base_url);
    let envelope = state
        .orchestrator
        .submit_and_wait(request, TaskKind::Parallel, &base_url)
        .await?;
    Ok(Json(envelope))
}

/// Ids that cannot name a task read as `UNKNOWN`, like ids nobody submitted
async fn task_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    let base_url = base_url(&headers, &state.fallback_base_url);
    let envelope = match Uuid::parse_str(&task_id) {
        Ok(id) => state.orchestrator.status(id, &base_url).await?,
        Err(_) => ResponseEnvelope::unknown(&task_id, &base_url),
    };
    Ok(Json(envelope))
}

/// Only the fields that are set are rendered
async fn task_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let envelope = match Uuid::parse_str(&task_id) {
        Ok(task_id) => state.orchestrator.result(task_id).await?,
        // No task can have this id
        Err(_) => ResponseEnvelope::result_only(&TaskSnapshot::unknown(Uuid::nil())),
    };
    Ok(Json(envelope.sparse()).into_response())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// `{scheme}://{host}/` as the client addressed us
fn base_url(headers: &HeaderMap, fallback: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty());

    let Some(host) = host else {
        return fallback.to_string();
    };

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|scheme| !scheme.is_empty())
        .unwrap_or("http");

    format!("{}://{}/", scheme, host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_base_url_from_host() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:5000"));
        assert_eq!(base_url(&headers, "http://fallback/"), "http://localhost:5000/");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert_eq!(base_url(&headers, "http://fallback/"), "https://localhost:5000/");
    }

    #[test]
    fn test_base_url_fallback() {
        assert_eq!(base_url(&HeaderMap::new(), "http://fallback/"), "http://fallback/");
    }
}
