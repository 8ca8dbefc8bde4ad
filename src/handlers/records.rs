//! # Record API Handlers
//!
//! Paginated listing and text search over mirrored GitHub records. Each
//! resource route (`organizations`, `repos`, `commits`, `issues`, `pulls`)
//! maps to one storage collection.

use axum::{
    extract::{Path, Query, State, rejection::QueryRejection},
    response::Json,
};
use sea_orm::Order;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use super::types::{PaginatedResponse, RecordView};
use crate::error::{ApiError, not_found, validation_error};
use crate::models::ResourceKind;
use crate::repositories::{RecordQuery, filter};
use crate::server::AppState;

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;
/// Largest page whose row offset still fits a signed 64-bit SQL OFFSET.
pub const MAX_PAGE: u64 = i64::MAX as u64 / MAX_LIMIT;

/// Query parameters for record listing
#[derive(Debug, Default, Deserialize, Serialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListRecordsQuery {
    /// 1-based page number (default: 1)
    pub page: Option<u64>,
    /// Page size (default: 10, clamped to 1..=100)
    pub limit: Option<u64>,
    /// Record column or dotted payload path to sort by (default: updated_at)
    pub sort_column: Option<String>,
    /// `asc` or `desc` (default: asc when sortColumn is given)
    pub sort_direction: Option<String>,
    /// JSON-encoded filter model keyed by field
    pub filter_model: Option<String>,
    /// Restrict to records synced by this GitHub user id
    pub user_id: Option<i64>,
}

/// Query parameters for text search
#[derive(Debug, Default, Deserialize, Serialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TextSearchQuery {
    /// Case-insensitive substring to look for in record payloads
    pub text: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    pub results: Vec<RecordView>,
}

fn resolve_resource(resource: &str) -> Result<ResourceKind, ApiError> {
    ResourceKind::from_route(resource)
        .ok_or_else(|| not_found(&format!("Unknown resource '{}'", resource)))
}

fn parse_direction(raw: Option<&str>) -> Result<Order, ApiError> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("asc") => Ok(Order::Asc),
        Some("desc") => Ok(Order::Desc),
        Some(other) => Err(validation_error(
            &format!("sortDirection must be 'asc' or 'desc', got '{}'", other),
            json!({ "sortDirection": other }),
        )),
    }
}

impl ListRecordsQuery {
    fn into_record_query(self, backend: sea_orm::DbBackend) -> Result<RecordQuery, ApiError> {
        let page = self.page.unwrap_or(1).max(1);
        if page > MAX_PAGE {
            return Err(validation_error(
                &format!("page must be at most {}", MAX_PAGE),
                json!({ "page": page }),
            ));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let condition = match self.filter_model.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let model = filter::parse_filter_model(raw)?;
                Some(filter::build_condition(&model, backend)?)
            }
            _ => None,
        };

        let sort = match self.sort_column.as_deref().map(str::trim) {
            Some(column) if !column.is_empty() => {
                let direction = parse_direction(self.sort_direction.as_deref())?;
                Some((filter::sort_expr(column, backend)?, direction))
            }
            _ => None,
        };

        Ok(RecordQuery {
            page,
            limit,
            user_id: self.user_id,
            condition,
            sort,
        })
    }
}

/// Lists stored records of one resource kind
#[utoipa::path(
    get,
    path = "/{resource}",
    params(
        ("resource" = String, Path, description = "organizations, repos, commits, issues or pulls"),
        ListRecordsQuery
    ),
    responses(
        (status = 200, description = "One page of records", body = PaginatedResponse<RecordView>),
        (status = 400, description = "Invalid query or filter model", body = ApiError),
        (status = 404, description = "Unknown resource", body = ApiError)
    ),
    tag = "records"
)]
pub async fn list_records(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    query: Result<Query<ListRecordsQuery>, QueryRejection>,
) -> Result<Json<PaginatedResponse<RecordView>>, ApiError> {
    let kind = resolve_resource(&resource)?;
    let Query(query) = query?;
    let record_query = query.into_record_query(state.records.backend())?;

    let page = state.records.list(kind, record_query).await?;
    Ok(Json(page.into()))
}

/// Free-text search over one resource kind (at most 100 results)
#[utoipa::path(
    get,
    path = "/{resource}/textSearch",
    params(
        ("resource" = String, Path, description = "organizations, repos, commits, issues or pulls"),
        TextSearchQuery
    ),
    responses(
        (status = 200, description = "Matching records", body = SearchResponse),
        (status = 400, description = "Missing search query", body = ApiError),
        (status = 404, description = "Unknown resource", body = ApiError)
    ),
    tag = "records"
)]
pub async fn text_search(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    query: Result<Query<TextSearchQuery>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let kind = resolve_resource(&resource)?;
    let Query(query) = query?;
    let text = query
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| validation_error("Missing search query", json!({ "text": "required" })))?;

    let results = state.records.search(kind, text, query.user_id).await?;
    Ok(Json(SearchResponse {
        results: results.into_iter().map(RecordView::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::DbBackend;

    #[test]
    fn limit_is_clamped_and_page_defaults() {
        let query = ListRecordsQuery {
            limit: Some(1_000),
            ..Default::default()
        }
        .into_record_query(DbBackend::Sqlite)
        .unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, MAX_LIMIT);

        let query = ListRecordsQuery {
            page: Some(0),
            limit: Some(0),
            ..Default::default()
        }
        .into_record_query(DbBackend::Sqlite)
        .unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 1);
    }

    #[test]
    fn page_beyond_offset_range_is_rejected() {
        let err = ListRecordsQuery {
            page: Some(u64::MAX),
            ..Default::default()
        }
        .into_record_query(DbBackend::Sqlite)
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);

        let query = ListRecordsQuery {
            page: Some(MAX_PAGE),
            ..Default::default()
        }
        .into_record_query(DbBackend::Sqlite)
        .unwrap();
        assert_eq!(query.page, MAX_PAGE);
    }

    #[test]
    fn bad_sort_direction_is_rejected() {
        let result = ListRecordsQuery {
            sort_column: Some("updated_at".into()),
            sort_direction: Some("sideways".into()),
            ..Default::default()
        }
        .into_record_query(DbBackend::Sqlite);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_resource_is_not_found() {
        let err = resolve_resource("gists").unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
        assert_eq!(resolve_resource("pulls").unwrap(), ResourceKind::PullRequests);
    }
}
