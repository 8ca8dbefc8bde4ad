//! Repository for mirrored GitHub records
//!
//! Every write is "find by natural key, then create or merge" inside its own
//! transaction. Reads support offset pagination, filter conditions and a
//! payload text search.

use anyhow::Result;
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::SimpleExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend,
    EntityTrait, ItemsAndPagesNumber, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::filter;
use crate::models::github_record::{self, Column, Entity as GithubRecord};
use crate::models::ResourceKind;

/// Maximum number of records returned by a text search.
pub const SEARCH_LIMIT: u64 = 100;

/// Identity of a mirrored record: collection, owning user and provider id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey {
    pub collection: ResourceKind,
    pub user_id: i64,
    pub natural_id: String,
}

/// Caller-supplied fields for an upsert.
#[derive(Debug, Clone, Default)]
pub struct RecordFields {
    pub org_id: Option<i64>,
    pub repo_id: Option<i64>,
    pub payload: Map<String, Value>,
}

/// Read-side listing parameters. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub page: u64,
    pub limit: u64,
    pub user_id: Option<i64>,
    pub condition: Option<Condition>,
    pub sort: Option<(SimpleExpr, Order)>,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            user_id: None,
            condition: None,
            sort: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordPage {
    pub records: Vec<github_record::Model>,
    pub total_docs: u64,
    pub total_pages: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone)]
pub struct GithubRecordRepository {
    pub db: Arc<DatabaseConnection>,
}

impl GithubRecordRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    /// Insert a new record, or merge `fields` into the stored one.
    ///
    /// The payload merge is top-level: incoming keys replace stored keys, keys
    /// absent from the incoming payload are kept. Back-references are only
    /// overwritten when supplied.
    pub async fn upsert(
        &self,
        key: &NaturalKey,
        fields: RecordFields,
    ) -> Result<github_record::Model> {
        let txn = self.db.begin().await?;
        let now: DateTimeWithTimeZone = Utc::now().into();

        let existing = GithubRecord::find()
            .filter(Column::Collection.eq(key.collection))
            .filter(Column::UserId.eq(key.user_id))
            .filter(Column::NaturalId.eq(key.natural_id.as_str()))
            .one(&txn)
            .await?;

        let stored = match existing {
            Some(existing) => {
                let mut payload = match &existing.payload {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                payload.extend(fields.payload);

                let mut active: github_record::ActiveModel = existing.into();
                active.payload = Set(Value::Object(payload));
                if let Some(org_id) = fields.org_id {
                    active.org_id = Set(Some(org_id));
                }
                if let Some(repo_id) = fields.repo_id {
                    active.repo_id = Set(Some(repo_id));
                }
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                github_record::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    collection: Set(key.collection),
                    user_id: Set(key.user_id),
                    natural_id: Set(key.natural_id.clone()),
                    org_id: Set(fields.org_id),
                    repo_id: Set(fields.repo_id),
                    payload: Set(Value::Object(fields.payload)),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;
        Ok(stored)
    }

    pub async fn find_by_natural_key(
        &self,
        key: &NaturalKey,
    ) -> Result<Option<github_record::Model>> {
        Ok(GithubRecord::find()
            .filter(Column::Collection.eq(key.collection))
            .filter(Column::UserId.eq(key.user_id))
            .filter(Column::NaturalId.eq(key.natural_id.as_str()))
            .one(&*self.db)
            .await?)
    }

    /// Records of one collection, optionally scoped to a user.
    pub async fn find_all(
        &self,
        collection: ResourceKind,
        user_id: Option<i64>,
    ) -> Result<Vec<github_record::Model>> {
        let mut query = GithubRecord::find().filter(Column::Collection.eq(collection));
        if let Some(user_id) = user_id {
            query = query.filter(Column::UserId.eq(user_id));
        }
        Ok(query
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn count(&self, collection: ResourceKind, user_id: Option<i64>) -> Result<u64> {
        let mut query = GithubRecord::find().filter(Column::Collection.eq(collection));
        if let Some(user_id) = user_id {
            query = query.filter(Column::UserId.eq(user_id));
        }
        Ok(query.count(&*self.db).await?)
    }

    /// One page of a collection. Defaults to newest `updated_at` first.
    pub async fn list(&self, collection: ResourceKind, params: RecordQuery) -> Result<RecordPage> {
        let page = params.page.max(1);
        let limit = params.limit.max(1);

        let mut query = GithubRecord::find().filter(Column::Collection.eq(collection));
        if let Some(user_id) = params.user_id {
            query = query.filter(Column::UserId.eq(user_id));
        }
        if let Some(condition) = params.condition {
            query = query.filter(condition);
        }
        query = match params.sort {
            Some((expr, order)) => query.order_by(expr, order),
            None => query.order_by_desc(Column::UpdatedAt),
        };
        query = query.order_by_asc(Column::Id);

        let paginator = query.paginate(&*self.db, limit);
        let ItemsAndPagesNumber {
            number_of_items,
            number_of_pages,
        } = paginator.num_items_and_pages().await?;
        // Past the last page there is nothing to fetch; skipping also keeps
        // the offset multiplication in range for huge page numbers.
        let records = if page > number_of_pages {
            Vec::new()
        } else {
            paginator.fetch_page(page - 1).await?
        };

        Ok(RecordPage {
            records,
            total_docs: number_of_items,
            total_pages: number_of_pages,
            page,
            limit,
        })
    }

    /// Case-insensitive substring search over the serialized payload.
    pub async fn search(
        &self,
        collection: ResourceKind,
        text: &str,
        user_id: Option<i64>,
    ) -> Result<Vec<github_record::Model>> {
        let mut query = GithubRecord::find()
            .filter(Column::Collection.eq(collection))
            .filter(filter::text_search_condition(text));
        if let Some(user_id) = user_id {
            query = query.filter(Column::UserId.eq(user_id));
        }
        Ok(query
            .order_by_desc(Column::UpdatedAt)
            .order_by_asc(Column::Id)
            .limit(SEARCH_LIMIT)
            .all(&*self.db)
            .await?)
    }
}
