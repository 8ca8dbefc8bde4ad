//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the GitHub sync API.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::health_check;
use crate::error::{ApiError, service_unavailable};
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod integration;
pub mod records;
pub mod types;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness plus a database round trip
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service and database are healthy", body = HealthResponse),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    health_check(&state.db).await.map_err(|error| {
        tracing::warn!(error = %error, "Health check failed");
        service_unavailable("Database unavailable")
    })?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

#[cfg(test)]
mod tests;
