//! # Integration Handlers
//!
//! CRUD and lifecycle endpoints for stored integrations. Responses never
//! include token material; ciphertext columns stay inside the token store.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::handlers::connect::{adapter_error, parse_provider};
use crate::models::integration;
use crate::models::{IntegrationStatus, Provider};
use crate::token_refresh::RefreshError;
use crate::token_store::TokenStoreError;
use crate::server::AppState;

/// Integration representation exposed over the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntegrationResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Provider identifier (google|microsoft|zoom|caldav)
    pub provider: String,
    /// Lifecycle status (connected|expired|disconnected)
    pub status: String,
    pub display_name: Option<String>,
    /// Access-token expiry, if the provider reported one
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted OAuth scopes
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<integration::Model> for IntegrationResponse {
    fn from(model: integration::Model) -> Self {
        let scopes = model
            .scopes
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        Self {
            id: model.id,
            user_id: model.user_id,
            provider: model.provider,
            status: model.status,
            display_name: model.display_name,
            expires_at: model.expires_at.map(Into::into),
            scopes,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

/// Query parameters for listing integrations
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListQuery {
    /// Owning user to list integrations for
    pub user_id: Uuid,
}

/// Path parameter for an integration id
#[derive(Debug, Deserialize, IntoParams)]
pub struct IntegrationPath {
    pub id: Uuid,
}

/// List a user's integrations
#[utoipa::path(
    get,
    path = "/integrations",
    security(("bearer_auth" = [])),
    params(ListQuery),
    responses(
        (status = 200, description = "Integrations for the user", body = [IntegrationResponse]),
        (status = 401, description = "Missing or invalid operator token", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn list(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<IntegrationResponse>>, ApiError> {
    let rows = state.integrations.find_by_user(&query.user_id).await?;
    Ok(Json(rows.into_iter().map(IntegrationResponse::from).collect()))
}

/// Fetch one integration
#[utoipa::path(
    get,
    path = "/integrations/{id}",
    security(("bearer_auth" = [])),
    params(IntegrationPath),
    responses(
        (status = 200, description = "The integration", body = IntegrationResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Integration not found", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn get(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(path): Path<IntegrationPath>,
) -> Result<Json<IntegrationResponse>, ApiError> {
    let row = state
        .integrations
        .get_by_id(&path.id)
        .await?
        .ok_or_else(|| not_found(path.id))?;
    Ok(Json(IntegrationResponse::from(row)))
}

/// Disconnect an integration
///
/// Revokes the token at the provider on a best-effort basis, then clears
/// the stored ciphertexts regardless of the revocation outcome. Local
/// cleanup must not be blocked by an unreachable provider.
#[utoipa::path(
    delete,
    path = "/integrations/{id}",
    security(("bearer_auth" = [])),
    params(IntegrationPath),
    responses(
        (status = 200, description = "Integration disconnected", body = IntegrationResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Integration not found", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn disconnect(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(path): Path<IntegrationPath>,
) -> Result<Json<IntegrationResponse>, ApiError> {
    let row = state
        .integrations
        .get_by_id(&path.id)
        .await?
        .ok_or_else(|| not_found(path.id))?;
    let provider = parse_provider(&row.provider)?;

    match state.token_store.retrieve(path.id).await {
        Ok(Some(tuple)) => {
            if let Ok(adapter) = state.registry.get(provider) {
                // Revoking the refresh token kills the whole grant where the
                // provider distinguishes the two.
                let token = tuple.refresh_token.as_deref().unwrap_or(&tuple.access_token);
                if let Err(e) = adapter.revoke(token).await {
                    warn!(
                        integration_id = %path.id,
                        provider = %provider,
                        error = %e,
                        "Provider revocation failed; clearing local tokens anyway"
                    );
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            warn!(
                integration_id = %path.id,
                error = %e,
                "Could not decrypt tokens for revocation; clearing local tokens anyway"
            );
        }
    }

    let cleared = state
        .token_store
        .clear(path.id, IntegrationStatus::Disconnected)
        .await?;

    if let Err(e) = state
        .security_events
        .record(
            provider,
            "integration_revoked",
            None,
            None,
            Some(serde_json::json!({ "integration_id": path.id })),
        )
        .await
    {
        warn!(error = ?e, "Failed to record revocation audit event");
    }

    info!(integration_id = %path.id, provider = %provider, "Integration disconnected");

    Ok(Json(IntegrationResponse::from(cleared)))
}

/// Refresh an integration's tokens immediately
#[utoipa::path(
    post,
    path = "/integrations/{id}/refresh",
    security(("bearer_auth" = [])),
    params(IntegrationPath),
    responses(
        (status = 200, description = "Tokens refreshed", body = IntegrationResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Integration not found", body = ApiError),
        (status = 409, description = "Integration has no refresh token", body = ApiError),
        (status = 502, description = "Provider refused or failed the refresh", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn refresh(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(path): Path<IntegrationPath>,
) -> Result<Json<IntegrationResponse>, ApiError> {
    let row = state
        .integrations
        .get_by_id(&path.id)
        .await?
        .ok_or_else(|| not_found(path.id))?;
    let provider = parse_provider(&row.provider)?;

    state
        .refresh
        .refresh_on_demand(path.id)
        .await
        .map_err(|e| refresh_error(path.id, provider, e))?;

    let row = state
        .integrations
        .get_by_id(&path.id)
        .await?
        .ok_or_else(|| not_found(path.id))?;
    Ok(Json(IntegrationResponse::from(row)))
}

fn not_found(id: Uuid) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        &format!("Integration '{}' not found", id),
    )
}

fn refresh_error(id: Uuid, provider: Provider, err: RefreshError) -> ApiError {
    match err {
        RefreshError::TokenMissing => ApiError::new(
            StatusCode::CONFLICT,
            "NO_REFRESH_TOKEN",
            "Integration has no refresh token; reconnect the provider",
        ),
        RefreshError::Terminal { source } | RefreshError::Retryable { source } => {
            warn!(integration_id = %id, error = %source, "On-demand refresh failed");
            adapter_error(provider, source)
        }
        RefreshError::Store(TokenStoreError::NotFound(_)) => not_found(id),
        RefreshError::Store(store) => ApiError::from(store),
        RefreshError::Registry(e) => crate::handlers::connect::registry_error(e),
        RefreshError::UnknownProvider(raw) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            &format!("stored provider '{}' is not recognized", raw),
        ),
        RefreshError::Database(e) => ApiError::from(e),
    }
}
