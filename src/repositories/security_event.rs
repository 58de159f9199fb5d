//! Security event repository
//!
//! Persists audit records for webhook rejections and token lifecycle
//! transitions. Records are append-only.

use anyhow::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Provider;
use crate::models::security_event::{self, Entity as SecurityEvent};

/// Repository for security event database operations
#[derive(Debug, Clone)]
pub struct SecurityEventRepository {
    pub db: Arc<DatabaseConnection>,
}

impl SecurityEventRepository {
    /// Creates a new SecurityEventRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Appends one security event.
    pub async fn record(
        &self,
        provider: Provider,
        kind: &str,
        client_ip: Option<String>,
        reason: Option<String>,
        detail: Option<serde_json::Value>,
    ) -> Result<security_event::Model> {
        let event = security_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            provider: Set(provider.as_str().to_string()),
            kind: Set(kind.to_string()),
            client_ip: Set(client_ip),
            reason: Set(reason),
            detail: Set(detail),
            created_at: Set(chrono::Utc::now().into()),
        };

        Ok(event.insert(&*self.db).await?)
    }

    /// Most recent events, optionally filtered by provider.
    pub async fn list_recent(
        &self,
        provider: Option<Provider>,
        limit: u64,
    ) -> Result<Vec<security_event::Model>> {
        let mut query = SecurityEvent::find()
            .order_by_desc(security_event::Column::CreatedAt)
            .limit(limit);

        if let Some(provider) = provider {
            query = query.filter(security_event::Column::Provider.eq(provider.as_str()));
        }

        Ok(query.all(&*self.db).await?)
    }
}
