//! Security event entity model
//!
//! Append-only audit rows for webhook validation outcomes, refresh failures,
//! and revocations.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "security_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Provider the event concerns
    pub provider: String,

    /// Event kind, e.g. webhook_accepted, webhook_rejected, rate_limited,
    /// replay_detected, token_refresh_invalid_grant, integration_revoked
    pub kind: String,

    /// Client IP for webhook events
    pub client_ip: Option<String>,

    /// Rejection reason or failure summary
    pub reason: Option<String>,

    /// Structured diagnostic detail (never contains token material)
    #[sea_orm(column_type = "JsonBinary")]
    pub detail: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
