//! Integration repository
//!
//! Holds one row per GitHub identity. Access tokens are encrypted on write and
//! decrypted on demand; plaintext never reaches the database.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{CryptoKey, open_access_token, seal_access_token};
use crate::models::integration::{self, Column, Entity as Integration};

/// Fields written by [`IntegrationRepository::save`].
#[derive(Debug, Clone)]
pub struct IntegrationUpsert<'a> {
    pub user_id: i64,
    pub username: &'a str,
    pub access_token: &'a str,
    pub in_progress: bool,
    /// Only overwrites the stored value when set.
    pub last_sync: Option<DateTimeWithTimeZone>,
}

#[derive(Debug, Clone)]
pub struct IntegrationRepository {
    pub db: Arc<DatabaseConnection>,
    pub crypto_key: CryptoKey,
}

impl IntegrationRepository {
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    pub async fn find_by_user_id(&self, user_id: i64) -> Result<Option<integration::Model>> {
        Ok(Integration::find()
            .filter(Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    /// Find-or-create by user id, encrypting the token.
    pub async fn save(&self, upsert: IntegrationUpsert<'_>) -> Result<integration::Model> {
        let ciphertext = seal_access_token(&self.crypto_key, upsert.user_id, upsert.access_token)
            .map_err(|e| anyhow!("Token encryption failed: {}", e))?;
        let now: DateTimeWithTimeZone = Utc::now().into();
        let in_progress = i16::from(upsert.in_progress);

        let txn = self.db.begin().await?;
        let existing = Integration::find()
            .filter(Column::UserId.eq(upsert.user_id))
            .one(&txn)
            .await?;

        let saved = match existing {
            Some(existing) => {
                let mut active: integration::ActiveModel = existing.into();
                active.username = Set(upsert.username.to_string());
                active.access_token_ciphertext = Set(ciphertext);
                active.in_progress = Set(in_progress);
                if let Some(last_sync) = upsert.last_sync {
                    active.last_sync = Set(Some(last_sync));
                }
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                integration::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(upsert.user_id),
                    username: Set(upsert.username.to_string()),
                    access_token_ciphertext: Set(ciphertext),
                    in_progress: Set(in_progress),
                    connected_at: Set(now),
                    last_sync: Set(upsert.last_sync),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;
        Ok(saved)
    }

    /// Set or clear the in-progress flag. Returns `None` when no integration exists.
    pub async fn set_in_progress(
        &self,
        user_id: i64,
        in_progress: bool,
    ) -> Result<Option<integration::Model>> {
        let Some(existing) = self.find_by_user_id(user_id).await? else {
            return Ok(None);
        };

        let mut active: integration::ActiveModel = existing.into();
        active.in_progress = Set(i16::from(in_progress));
        active.updated_at = Set(Utc::now().into());
        Ok(Some(active.update(&*self.db).await?))
    }

    /// Delete the integration row only. Mirrored records are kept.
    pub async fn delete_by_user_id(&self, user_id: i64) -> Result<bool> {
        let result = Integration::delete_many()
            .filter(Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub fn decrypt_token(&self, integration: &integration::Model) -> Result<String> {
        open_access_token(
            &self.crypto_key,
            integration.user_id,
            &integration.access_token_ciphertext,
        )
        .map_err(|e| {
            tracing::error!(user_id = integration.user_id, "Token decryption failed");
            anyhow!("Token decryption failed: {}", e)
        })
    }
}
