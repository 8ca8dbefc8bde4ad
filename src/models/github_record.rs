//! Mirrored GitHub record entity model
//!
//! Organizations, repositories, commits, issues and pull requests are stored
//! as JSON documents in a single table, partitioned by [`ResourceKind`].

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::resource_kind::ResourceKind;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "github_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Resource kind this record belongs to
    pub collection: ResourceKind,

    /// GitHub user id of the identity that synced this record
    pub user_id: i64,

    /// Provider-assigned identifier (numeric id, or sha for commits) as text
    pub natural_id: String,

    /// Organization back-reference (informational)
    pub org_id: Option<i64>,

    /// Repository back-reference (informational)
    pub repo_id: Option<i64>,

    /// Provider-supplied fields, merged across syncs
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Read a string field from the payload.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(JsonValue::as_str)
    }

    /// Parse the natural id as a numeric provider id.
    pub fn numeric_id(&self) -> Option<i64> {
        self.natural_id.parse().ok()
    }
}
