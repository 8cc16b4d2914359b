//! HTTP API for the front end
//!
//! Provides:
//! - sandbox status queries (`validity` probes and may start a recreation,
//!   `status` is a pure query meant for polling)
//! - job submission for new projects and follow-up messages
//! - Prometheus metrics and a health check

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::agent::prompts::ERROR_MESSAGE;
use crate::events::{DispatchError, EventDispatcher, GenerationRequest, JobEvent};
use crate::lifecycle::{LifecycleError, SandboxLifecycleManager, SandboxStatus};
use crate::metrics;
use crate::store::{NewMessage, ProjectStore, StoreError};

/// Longest accepted request text, in characters
pub const MAX_CONTENT_CHARS: usize = 10_000;

const POLL_INTERVAL_HEADER: HeaderName = HeaderName::from_static("x-poll-interval-ms");

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProjectStore>,
    pub lifecycle: Arc<SandboxLifecycleManager>,
    pub dispatcher: Arc<dyn EventDispatcher>,
    /// Suggested polling interval while a sandbox is recreating
    pub poll_interval_ms: u64,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/artifacts/{id}/validity", post(check_validity))
        .route("/api/artifacts/{id}/status", get(poll_status))
        .route("/api/projects", post(create_project))
        .route("/api/projects/{id}/messages", post(create_message))
        .with_state(state)
}

/// Error returned by API handlers, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
    /// Request was stored but no job was queued for it; the body also
    /// carries `projectId` so the client can retry on the same project
    NotQueued { project_id: String, message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotQueued { project_id, message } => {
                let body = json!({ "error": message, "projectId": project_id });
                return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
            }
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            other => {
                error!(error = %other, "Store failure");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::NotFound(_) => ApiError::NotFound(e.to_string()),
            LifecycleError::Store(inner) => inner.into(),
            LifecycleError::Dispatch(inner) => inner.into(),
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn prometheus_metrics() -> String {
    metrics::gather_text()
}

fn status_response(state: &AppState, status: SandboxStatus) -> Response {
    let mut response = Json(status).into_response();
    if let Ok(value) = HeaderValue::from_str(&state.poll_interval_ms.to_string()) {
        response.headers_mut().insert(POLL_INTERVAL_HEADER, value);
    }
    response
}

/// POST /api/artifacts/{id}/validity - probe, starting a recreation if dead
async fn check_validity(
    State(state): State<AppState>,
    Path(artifact_id): Path<String>,
) -> Result<Response, ApiError> {
    let status = state.lifecycle.check_validity(&artifact_id).await?;
    Ok(status_response(&state, status))
}

/// GET /api/artifacts/{id}/status - current status, no side effects
async fn poll_status(
    State(state): State<AppState>,
    Path(artifact_id): Path<String>,
) -> Result<Response, ApiError> {
    let status = state.lifecycle.poll_status(&artifact_id).await?;
    Ok(status_response(&state, status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody {
    content: String,
    #[serde(default)]
    artifact_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_name: Option<String>,
    message_id: String,
}

fn validate_content(content: &str) -> Result<(), ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::BadRequest("content is required".to_string()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "content must be at most {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(())
}

/// Readable project name: first words of the request plus a short suffix
pub fn project_slug(content: &str) -> String {
    let words: Vec<String> = content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(4)
        .map(str::to_lowercase)
        .collect();
    let stem = if words.is_empty() {
        "project".to_string()
    } else {
        words.join("-")
    };
    let id = Uuid::now_v7().simple().to_string();
    format!("{stem}-{}", &id[id.len() - 6..])
}

/// Queue a generation job for a stored request.
///
/// The user message is already persisted, so a failed dispatch leaves an
/// error reply on the project instead of an unanswered request.
async fn dispatch_generation(
    state: &AppState,
    message_id: &str,
    request: GenerationRequest,
) -> Result<(), ApiError> {
    let project_id = request.project_id.clone();
    let Err(e) = state.dispatcher.send(JobEvent::Generation(request)).await else {
        return Ok(());
    };

    error!(project_id = %project_id, message_id, error = %e, "Generation not queued");
    if let Err(store_err) = state
        .store
        .create_message(NewMessage::error(&project_id, ERROR_MESSAGE))
        .await
    {
        error!(project_id = %project_id, error = %store_err, "Could not record dispatch failure");
    }
    Err(ApiError::NotQueued {
        project_id,
        message: e.to_string(),
    })
}

/// POST /api/projects - new project from its first request
async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    validate_content(&body.content)?;

    let project = state.store.create_project(&project_slug(&body.content)).await?;
    let (message, _) = state
        .store
        .create_message(NewMessage::user(&project.id, body.content.clone()))
        .await?;

    dispatch_generation(
        &state,
        &message.id,
        GenerationRequest {
            content: body.content,
            project_id: project.id.clone(),
            prior_artifact_id: None,
        },
    )
    .await?;

    info!(project_id = %project.id, name = %project.name, "Project created");
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            project_id: project.id,
            project_name: Some(project.name),
            message_id: message.id,
        }),
    ))
}

/// POST /api/projects/{id}/messages - follow-up request on an existing project
async fn create_message(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    validate_content(&body.content)?;

    let project = state
        .store
        .find_project(&project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {project_id} not found")))?;

    let (message, _) = state
        .store
        .create_message(NewMessage::user(&project.id, body.content.clone()))
        .await?;

    dispatch_generation(
        &state,
        &message.id,
        GenerationRequest {
            content: body.content,
            project_id: project.id.clone(),
            prior_artifact_id: body.artifact_id,
        },
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            project_id: project.id,
            project_name: None,
            message_id: message.id,
        }),
    ))
}
