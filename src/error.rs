//! # Error Handling
//!
//! Unified HTTP error responses rendered as `application/problem+json`, with
//! trace id propagation and mappings from the service's domain errors.

use axum::{
    extract::rejection::QueryRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::github::GitHubError;
use crate::repositories::FilterError;
use crate::sync::SyncError;
use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    #[schema(value_type = String)]
    pub code: Box<str>,
    /// Human-readable error message
    #[schema(value_type = String)]
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Request trace id when inside one, otherwise a short correlation id.
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                let id = uuid::Uuid::new_v4().simple().to_string();
                Some(format!("corr-{}", &id[..8]).into_boxed_str())
            })
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_ref()))
}

/// Upstream provider error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderError {
    /// Provider identifier
    pub provider: String,
    /// HTTP status code from upstream, when one was received
    pub status: Option<u16>,
    /// Response body snippet from upstream (truncated)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        validation_error(&rejection.body_text(), json!({}))
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::AuthExchangeFailed(message) => Self::new(
                StatusCode::BAD_REQUEST,
                "AUTH_EXCHANGE_FAILED",
                message,
            ),
            SyncError::IdentityResolutionFailed(source) => {
                let error = provider_error("github", source.upstream_status(), Some(source.to_string()));
                match source {
                    GitHubError::RateLimited {
                        reset: Some(reset), ..
                    } => {
                        let wait = (reset - chrono::Utc::now()).num_seconds().max(1);
                        error.with_retry_after(wait as u64)
                    }
                    _ => error,
                }
            }
            SyncError::AlreadyRunning { user_id } => Self::new(
                StatusCode::CONFLICT,
                "SYNC_IN_PROGRESS",
                format!("A sync is already running for user {}", user_id),
            ),
            SyncError::Store(source) => match source.downcast::<sea_orm::DbErr>() {
                Ok(db_err) => db_err.into(),
                Err(other) => other.into(),
            },
            other => {
                tracing::error!(error = %other, "Sync failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SYNC_FAILED",
                    other.to_string(),
                )
            }
        }
    }
}

impl From<FilterError> for ApiError {
    fn from(error: FilterError) -> Self {
        validation_error(&error.to_string(), json!({ "field": "filterModel" }))
    }
}

/// Create a provider upstream error (always 502 PROVIDER_ERROR)
pub fn provider_error(provider: &str, status: Option<u16>, body: Option<String>) -> ApiError {
    let provider_error = ProviderError {
        provider: provider.to_string(),
        status,
        body_snippet: body.map(|b| {
            if b.chars().count() > 200 {
                let truncated: String = b.chars().take(200).collect();
                format!("{}...", truncated)
            } else {
                b
            }
        }),
    };

    let message = match status {
        Some(status) => format!("Provider {} returned error status {}", provider, status),
        None => format!("Provider {} request failed", provider),
    };

    ApiError::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message)
        .with_details(json!(provider_error))
}

pub fn not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

pub fn service_unavailable(message: &str) -> ApiError {
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
}

pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_set_status_and_code() {
        let missing = not_found("User not found");
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.code, Box::from("NOT_FOUND"));
        assert!(missing.trace_id.is_some());

        let down = service_unavailable("Database unavailable");
        assert_eq!(down.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(down.code, Box::from("SERVICE_UNAVAILABLE"));
    }

    #[test]
    fn anyhow_maps_to_internal_error_without_leaking_message() {
        let error: ApiError = anyhow::anyhow!("secret detail").into();
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.message.contains("secret detail"));
    }

    #[test]
    fn record_not_found_maps_to_404() {
        let error: ApiError = sea_orm::DbErr::RecordNotFound("integration".to_string()).into();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn sync_errors_map_to_statuses() {
        let auth: ApiError = SyncError::AuthExchangeFailed("bad_verification_code".into()).into();
        assert_eq!(auth.status, StatusCode::BAD_REQUEST);
        assert_eq!(auth.code, Box::from("AUTH_EXCHANGE_FAILED"));

        let identity: ApiError = SyncError::IdentityResolutionFailed(GitHubError::Api {
            status: 401,
            message: "Bad credentials".into(),
        })
        .into();
        assert_eq!(identity.status, StatusCode::BAD_GATEWAY);
        assert_eq!(identity.code, Box::from("PROVIDER_ERROR"));

        let busy: ApiError = SyncError::AlreadyRunning { user_id: 7 }.into();
        assert_eq!(busy.status, StatusCode::CONFLICT);

        let store: ApiError =
            SyncError::Store(sea_orm::DbErr::Conn(sea_orm::RuntimeErr::Internal("down".into())).into())
                .into();
        assert_eq!(store.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn provider_error_truncates_body_on_char_boundary() {
        let body = "é".repeat(300);
        let error = provider_error("github", Some(503), Some(body));
        let details = error.details.expect("details present");
        let snippet = details["body_snippet"].as_str().unwrap();
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), 203);
    }

    #[test]
    fn problem_json_content_type() {
        let response = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "nope")
            .with_retry_after(5)
            .into_response();
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
        assert_eq!(response.headers().get("retry-after").unwrap(), "5");
    }
}
