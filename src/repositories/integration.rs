//! Integration repository for database operations
//!
//! Encapsulates SeaORM operations for the integrations table. Token
//! ciphertexts pass through as opaque bytes; encryption and decryption
//! belong to the token store.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::integration::{self, Entity as Integration};
use crate::models::provider::IntegrationStatus;

/// Repository for integration database operations
#[derive(Debug, Clone)]
pub struct IntegrationRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl IntegrationRepository {
    /// Creates a new IntegrationRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a new integration record
    pub async fn create(&self, integration: integration::ActiveModel) -> Result<integration::Model> {
        let id = integration
            .id
            .clone()
            .take()
            .ok_or_else(|| anyhow!("integration id must be set"))?;

        integration.insert(&*self.db).await?;

        // For SQLite, query the record directly since we already know the ID
        let fetched = Integration::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("integration not persisted"))
    }

    /// Retrieves an integration by its ID
    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<integration::Model>> {
        Ok(Integration::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists all integrations for a user ordered by creation time then ID
    pub async fn find_by_user(&self, user_id: &Uuid) -> Result<Vec<integration::Model>> {
        Ok(Integration::find()
            .filter(integration::Column::UserId.eq(*user_id))
            .order_by_asc(integration::Column::CreatedAt)
            .order_by_asc(integration::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Finds the integration for a unique `(user, provider)` pair
    pub async fn find_by_user_and_provider(
        &self,
        user_id: &Uuid,
        provider: &str,
    ) -> Result<Option<integration::Model>> {
        Ok(Integration::find()
            .filter(integration::Column::UserId.eq(*user_id))
            .filter(integration::Column::Provider.eq(provider))
            .one(&*self.db)
            .await?)
    }

    /// Partial update helper for token/status/expiry mutations
    pub async fn update_tokens_status(
        &self,
        id: &Uuid,
        access_token_ciphertext: Option<Vec<u8>>,
        refresh_token_ciphertext: Option<Vec<u8>>,
        status: Option<IntegrationStatus>,
        expires_at: Option<Option<DateTime<Utc>>>,
        scopes: Option<serde_json::Value>,
    ) -> Result<integration::Model> {
        let existing = Integration::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Integration '{}' not found", id))?;

        let mut model: integration::ActiveModel = existing.into();

        if let Some(cipher) = access_token_ciphertext {
            model.access_token_ciphertext = Set(Some(cipher));
        }
        if let Some(cipher) = refresh_token_ciphertext {
            model.refresh_token_ciphertext = Set(Some(cipher));
        }
        if let Some(status) = status {
            model.status = Set(status.as_str().to_string());
        }
        if let Some(expires_at) = expires_at {
            let fixed: Option<DateTimeWithTimeZone> = expires_at.map(Into::into);
            model.expires_at = Set(fixed);
        }
        if let Some(scopes) = scopes {
            model.scopes = Set(Some(scopes));
        }
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Sets only the lifecycle status of an integration
    pub async fn mark_status(&self, id: &Uuid, status: IntegrationStatus) -> Result<integration::Model> {
        let existing = Integration::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Integration '{}' not found", id))?;

        let mut model: integration::ActiveModel = existing.into();
        model.status = Set(status.as_str().to_string());
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Nulls out both token ciphertexts and marks the integration with the
    /// given status. Used for disconnect.
    pub async fn clear_tokens(
        &self,
        id: &Uuid,
        status: IntegrationStatus,
    ) -> Result<integration::Model> {
        let existing = Integration::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Integration '{}' not found", id))?;

        let mut model: integration::ActiveModel = existing.into();
        model.access_token_ciphertext = Set(None);
        model.refresh_token_ciphertext = Set(None);
        model.expires_at = Set(None);
        model.status = Set(status.as_str().to_string());
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Connected integrations holding a refresh token whose expiry falls at
    /// or before `cutoff`. Rows without a recorded expiry are included, the
    /// refresh path treats an unknown expiry as already expiring.
    pub async fn find_due_for_refresh(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<integration::Model>> {
        let cutoff_fixed: DateTimeWithTimeZone = cutoff.into();
        Ok(Integration::find()
            .filter(integration::Column::Status.eq(IntegrationStatus::Connected.as_str()))
            .filter(integration::Column::RefreshTokenCiphertext.is_not_null())
            .filter(
                Condition::any()
                    .add(integration::Column::ExpiresAt.is_null())
                    .add(integration::Column::ExpiresAt.lte(cutoff_fixed)),
            )
            .order_by_asc(integration::Column::ExpiresAt)
            .order_by_asc(integration::Column::Id)
            .all(&*self.db)
            .await?)
    }
}
