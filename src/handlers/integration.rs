//! # Integration API Handlers
//!
//! OAuth callback that starts a sync, job event stream, sync status lookup
//! and logout.

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{
        IntoResponse, Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::{self, Stream};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::types::MessageResponse;
use crate::config::SyncMode;
use crate::error::{ApiError, not_found, validation_error};
use crate::models::integration;
use crate::server::AppState;
use crate::sync::{IntegrationSummary, SyncEvent, SyncReport};

/// Query parameters for the OAuth callback
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct IntegrateQuery {
    /// Authorization code issued by GitHub
    pub code: Option<String>,
}

/// Query parameters for the job event stream
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Follow only this job; the stream closes after its terminal event
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    /// Numeric GitHub user id
    pub user_id: i64,
}

/// Acknowledgment for a background sync
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncAccepted {
    #[schema(value_type = String)]
    pub job_id: Uuid,
    pub message: String,
}

/// Result of a sync run in `sync` mode
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncCompleted {
    pub message: String,
    pub payload: IntegrationSummary,
    pub report: SyncReport,
}

/// Integration state without the access token
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncStatus {
    pub user_id: i64,
    pub username: String,
    pub in_progress: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub connected_at: DateTime<Utc>,
}

impl From<integration::Model> for SyncStatus {
    fn from(model: integration::Model) -> Self {
        Self {
            in_progress: model.is_in_progress(),
            user_id: model.user_id,
            username: model.username,
            last_sync: model.last_sync.map(|at| at.with_timezone(&Utc)),
            connected_at: model.connected_at.with_timezone(&Utc),
        }
    }
}

/// OAuth callback. Exchanges the code and syncs the user's GitHub data.
///
/// In `async` mode the response is sent before the sync starts; the outcome
/// is published as a terminal job event.
#[utoipa::path(
    get,
    path = "/integration",
    params(IntegrateQuery),
    responses(
        (status = 202, description = "Sync job accepted", body = SyncAccepted),
        (status = 200, description = "Sync finished (sync mode)", body = SyncCompleted),
        (status = 400, description = "Missing or rejected authorization code", body = ApiError),
        (status = 409, description = "A sync is already running for this user", body = ApiError),
        (status = 502, description = "GitHub identity lookup failed", body = ApiError)
    ),
    tag = "integration"
)]
pub async fn integrate(
    State(state): State<AppState>,
    query: Result<Query<IntegrateQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let code = query
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .ok_or_else(|| {
            validation_error("Missing authorization code", json!({ "code": "required" }))
        })?;

    match state.config.sync.mode {
        SyncMode::Async => {
            let handle = state.runner.submit(code)?;
            tracing::info!(job_id = %handle.job_id, "GitHub sync job accepted");
            let body = SyncAccepted {
                job_id: handle.job_id,
                message: "GitHub sync started".to_string(),
            };
            Ok((StatusCode::ACCEPTED, Json(body)).into_response())
        }
        SyncMode::Sync => {
            let outcome = state.runner.run_inline(code).await?;
            let body = SyncCompleted {
                message: "GitHub Integration successful".to_string(),
                payload: outcome.integration,
                report: outcome.report,
            };
            Ok((StatusCode::OK, Json(body)).into_response())
        }
    }
}

/// Server-sent job events
///
/// Each event is named after its kind (`started`, `completed`, `failed`) and
/// carries the JSON event as data. With `jobId` the stream ends after that
/// job's terminal event, even if the job finished before the client connected.
#[utoipa::path(
    get,
    path = "/integration/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "Stream of job events", content_type = "text/event-stream", body = SyncEvent),
        (status = 400, description = "Invalid jobId", body = ApiError)
    ),
    tag = "integration"
)]
pub async fn events(
    State(state): State<AppState>,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let Query(query) = query?;
    tracing::debug!(job_id = ?query.job_id, "Job event watcher connected");

    let watch = state.events.watch(query.job_id);
    let stream = stream::unfold(watch, |mut watch| async move {
        let event = watch.next_event().await?;
        let frame = Event::default()
            .event(event.kind.as_str())
            .id(event.job_id.to_string())
            .json_data(&event);
        Some((frame, watch))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Current integration state for a user, including the in-progress flag
#[utoipa::path(
    get,
    path = "/integration/checkSyncStatus",
    params(UserQuery),
    responses(
        (status = 200, description = "Integration state", body = SyncStatus),
        (status = 400, description = "Missing or invalid userId", body = ApiError),
        (status = 404, description = "No integration for this user", body = ApiError)
    ),
    tag = "integration"
)]
pub async fn check_sync_status(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<SyncStatus>, ApiError> {
    let Query(query) = query?;
    let integration = state
        .integrations
        .find_by_user_id(query.user_id)
        .await?
        .ok_or_else(|| not_found("User not found"))?;

    Ok(Json(integration.into()))
}

/// Removes the stored integration.
///
/// Only the integration record is deleted; mirrored organizations,
/// repositories, commits, issues and pull requests stay in place.
#[utoipa::path(
    get,
    path = "/integration/logout",
    params(UserQuery),
    responses(
        (status = 200, description = "Integration removed", body = MessageResponse),
        (status = 400, description = "Missing or invalid userId", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    tag = "integration"
)]
pub async fn logout(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Query(query) = query?;
    if !state.integrations.delete_by_user_id(query.user_id).await? {
        return Err(not_found("User not found"));
    }

    tracing::info!(user_id = query.user_id, "GitHub integration removed");
    Ok(Json(MessageResponse::new("Logged out successfully")))
}
