//! Test utilities for database-backed testing.
//!
//! Sets up in-memory SQLite databases with migrations applied and provides
//! fixture builders for integrations and configuration.

use anyhow::Result;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection, Set};
use std::sync::Arc;
use uuid::Uuid;

use calbridge::config::AppConfig;
use calbridge::crypto::TokenTuple;
use calbridge::models::integration;
use calbridge::models::{IntegrationStatus, Provider};

/// Sets up an in-memory SQLite database with all migrations applied.
#[allow(dead_code)]
pub async fn setup_test_db() -> Result<Arc<DatabaseConnection>> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(Arc::new(db))
}

/// Master secret used by token store fixtures.
#[allow(dead_code)]
pub fn test_master_secret() -> Vec<u8> {
    b"test-master-secret-32-bytes-long".to_vec()
}

/// Baseline configuration for tests: test profile, operator token, master
/// secret, and zero refresh jitter so sweeps run without delay.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    let mut config = AppConfig {
        profile: "test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        operator_tokens: vec!["test-operator-token".to_string()],
        master_secret: Some(test_master_secret()),
        ..AppConfig::default()
    };
    config.token_refresh.jitter_factor = 0.0;
    config
}

/// Builds an integration row ready for insertion, without token material.
#[allow(dead_code)]
pub fn integration_fixture(user_id: Uuid, provider: Provider) -> integration::ActiveModel {
    let now = Utc::now();
    integration::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        provider: Set(provider.as_str().to_string()),
        status: Set(IntegrationStatus::Connected.as_str().to_string()),
        display_name: Set(Some("fixture@example.com".to_string())),
        access_token_ciphertext: Set(None),
        refresh_token_ciphertext: Set(None),
        expires_at: Set(None),
        scopes: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
}

/// A representative token tuple with a refresh token and expiry.
#[allow(dead_code)]
pub fn sample_tuple(expires_at: Option<DateTime<Utc>>) -> TokenTuple {
    TokenTuple {
        access_token: "access-token-1".to_string(),
        refresh_token: Some("refresh-token-1".to_string()),
        expires_at,
        scopes: vec!["calendar.read".to_string(), "calendar.write".to_string()],
    }
}
