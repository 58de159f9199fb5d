//! Integration entity model
//!
//! This module contains the SeaORM entity model for the integrations table,
//! which stores one user's OAuth connection to one external provider.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Integration entity representing a user's stored OAuth connection
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    /// Unique identifier for the integration (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Provider identifier (google|microsoft|zoom|caldav)
    pub provider: String,

    /// Lifecycle status (connected|expired|disconnected)
    pub status: String,

    /// Display name, typically the provider account email
    pub display_name: Option<String>,

    /// Encrypted access-token blob (version || nonce || ciphertext+tag)
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted refresh-token blob
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Access-token expiry; absent expiry is treated as "refresh eagerly"
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Granted OAuth scopes, stored as a JSON array
    #[sea_orm(column_type = "JsonBinary")]
    pub scopes: Option<JsonValue>,

    /// Timestamp when the integration was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the integration was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
