//! # Common API Types
//!
//! Response shapes shared by the record listing and integration endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{ResourceKind, github_record};
use crate::repositories::RecordPage;

/// Offset pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageMeta {
    pub total_docs: u64,
    pub total_pages: u64,
    pub page: u64,
    pub limit: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    pub next_page: Option<u64>,
    pub prev_page: Option<u64>,
}

impl PageMeta {
    pub fn new(total_docs: u64, total_pages: u64, page: u64, limit: u64) -> Self {
        let has_next_page = page < total_pages;
        let has_prev_page = page > 1;
        Self {
            total_docs,
            total_pages,
            page,
            limit,
            has_next_page,
            has_prev_page,
            next_page: has_next_page.then_some(page + 1),
            prev_page: has_prev_page.then(|| page - 1),
        }
    }
}

/// Generic paginated response wrapper for list endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    /// Items on the current page
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// A stored GitHub record as returned by the read API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordView {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub collection: ResourceKind,
    pub user_id: i64,
    /// Provider id (sha for commits)
    pub natural_id: String,
    pub org_id: Option<i64>,
    pub repo_id: Option<i64>,
    /// Provider-supplied fields
    #[schema(value_type = Object)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<github_record::Model> for RecordView {
    fn from(model: github_record::Model) -> Self {
        Self {
            id: model.id,
            collection: model.collection,
            user_id: model.user_id,
            natural_id: model.natural_id,
            org_id: model.org_id,
            repo_id: model.repo_id,
            payload: model.payload,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<RecordPage> for PaginatedResponse<RecordView> {
    fn from(page: RecordPage) -> Self {
        Self {
            meta: PageMeta::new(page.total_docs, page.total_pages, page.page, page.limit),
            data: page.records.into_iter().map(RecordView::from).collect(),
        }
    }
}

/// Plain message body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_on_middle_page_links_both_ways() {
        let meta = PageMeta::new(25, 3, 2, 10);
        assert!(meta.has_next_page && meta.has_prev_page);
        assert_eq!(meta.next_page, Some(3));
        assert_eq!(meta.prev_page, Some(1));
    }

    #[test]
    fn meta_on_empty_collection_has_no_links() {
        let meta = PageMeta::new(0, 0, 1, 10);
        assert!(!meta.has_next_page);
        assert!(!meta.has_prev_page);
        assert_eq!(meta.next_page, None);
        assert_eq!(meta.prev_page, None);
    }
}
