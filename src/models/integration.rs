//! Integration entity model
//!
//! One row per linked GitHub identity, holding the encrypted access token and
//! the sync bookkeeping (`last_sync`, `in_progress`).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// External GitHub user id (unique)
    pub user_id: i64,

    /// GitHub login
    pub username: String,

    /// AES-256-GCM ciphertext of the access token
    pub access_token_ciphertext: Vec<u8>,

    /// 1 while a sync run is active for this identity, 0 otherwise
    pub in_progress: i16,

    pub connected_at: DateTimeWithTimeZone,

    pub last_sync: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_in_progress(&self) -> bool {
        self.in_progress != 0
    }
}
