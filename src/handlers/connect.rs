//! # OAuth Connect Handlers
//!
//! Handlers for starting an OAuth authorization flow and completing it with
//! the provider's callback code.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use base64::Engine;
use rand::Rng;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::adapters::{AdapterError, AuthorizeParams, RegistryError};
use crate::auth::OperatorAuth;
use crate::error::{ApiError, provider_error};
use crate::handlers::integrations::IntegrationResponse;
use crate::models::Provider;
use crate::server::AppState;

/// Path parameter for provider identifier
#[derive(Debug, Deserialize, IntoParams)]
pub struct ProviderPath {
    /// Provider identifier (lowercase, e.g., "google")
    #[param(example = "google")]
    pub provider: String,
}

/// Query parameters for the authorize endpoint
#[derive(Debug, Deserialize, IntoParams)]
pub struct AuthorizeQuery {
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// CSRF state token; generated when absent
    pub state: Option<String>,
}

/// OAuth authorization URL response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeUrlResponse {
    /// Complete authorization URL for user redirection
    pub authorize_url: String,
    /// State token embedded in the URL; the callback must echo it
    pub state: String,
}

/// Request body for completing the OAuth flow
#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackRequest {
    /// Authorization code returned by the provider
    pub code: String,
    /// Redirect URI used in the authorize step
    pub redirect_uri: String,
    /// User the resulting integration belongs to
    pub user_id: Uuid,
}

pub(crate) fn parse_provider(raw: &str) -> Result<Provider, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("provider '{}' not found", raw),
        )
    })
}

pub(crate) fn registry_error(err: RegistryError) -> ApiError {
    match err {
        RegistryError::ProviderNotRegistered(provider) => ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("provider '{}' is not configured", provider),
        ),
    }
}

/// Map an adapter failure onto the API error surface without leaking
/// provider internals beyond a truncated body snippet.
pub(crate) fn adapter_error(provider: Provider, err: AdapterError) -> ApiError {
    match err {
        AdapterError::ProviderRejected { status, body, .. } => {
            provider_error(provider.to_string(), status, body)
        }
        AdapterError::ProviderUnavailable { status } => {
            provider_error(provider.to_string(), status, None)
        }
        AdapterError::Network { details } => {
            error!(provider = %provider, details = %details, "Provider network failure");
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                &format!("provider '{}' is unreachable", provider),
            )
        }
        AdapterError::MalformedResponse { details } => {
            error!(provider = %provider, details = %details, "Malformed provider response");
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                &format!("provider '{}' returned an unusable response", provider),
            )
        }
        AdapterError::NotSupported { operation } => ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("provider '{}' does not support {}", provider, operation),
        ),
    }
}

fn generate_state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the authorization URL for a provider
#[utoipa::path(
    get,
    path = "/providers/{provider}/authorize",
    security(("bearer_auth" = [])),
    params(ProviderPath, AuthorizeQuery),
    responses(
        (status = 200, description = "Authorization URL generated", body = AuthorizeUrlResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Provider unknown or not configured", body = ApiError)
    ),
    tag = "connect"
)]
pub async fn authorize(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(path): Path<ProviderPath>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    let provider = parse_provider(&path.provider)?;
    let adapter = state.registry.get(provider).map_err(registry_error)?;

    let state_token = query.state.unwrap_or_else(generate_state_token);
    let params = AuthorizeParams {
        redirect_uri: query.redirect_uri,
        state: state_token.clone(),
    };

    let url = adapter
        .authorize_url(&params)
        .map_err(|e| adapter_error(provider, e))?;

    info!(provider = %provider, "OAuth authorization URL generated");

    Ok(Json(AuthorizeUrlResponse {
        authorize_url: url.to_string(),
        state: state_token,
    }))
}

/// Complete the OAuth flow with the provider's authorization code
///
/// Exchanges the code for tokens, fetches the account profile for the
/// display name, and persists the integration with encrypted token columns.
/// An existing integration for the same (user, provider) pair is
/// reconnected in place.
#[utoipa::path(
    post,
    path = "/providers/{provider}/callback",
    security(("bearer_auth" = [])),
    params(ProviderPath),
    request_body = CallbackRequest,
    responses(
        (status = 201, description = "Integration created", body = IntegrationResponse),
        (status = 200, description = "Existing integration reconnected", body = IntegrationResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Provider unknown or not configured", body = ApiError),
        (status = 502, description = "Provider rejected the code exchange", body = ApiError)
    ),
    tag = "connect"
)]
pub async fn callback(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(path): Path<ProviderPath>,
    Json(request): Json<CallbackRequest>,
) -> Result<(StatusCode, Json<IntegrationResponse>), ApiError> {
    let provider = parse_provider(&path.provider)?;
    let adapter = state.registry.get(provider).map_err(registry_error)?;

    let tuple = adapter
        .exchange_code(&request.code, &request.redirect_uri)
        .await
        .map_err(|e| adapter_error(provider, e))?;

    let profile = adapter
        .get_user_profile(&tuple.access_token)
        .await
        .map_err(|e| adapter_error(provider, e))?;
    let display_name = profile.email.or(profile.display_name);

    let existing = state
        .integrations
        .find_by_user_and_provider(&request.user_id, provider.as_str())
        .await?;

    if let Some(existing) = existing {
        let updated = state.token_store.store(existing.id, &tuple).await?;
        info!(
            integration_id = %existing.id,
            provider = %provider,
            "Reconnected existing integration"
        );
        return Ok((StatusCode::OK, Json(IntegrationResponse::from(updated))));
    }

    let integration_id = Uuid::new_v4();
    let now = chrono::Utc::now();
    let mut model = crate::models::integration::ActiveModel {
        id: Set(integration_id),
        user_id: Set(request.user_id),
        provider: Set(provider.as_str().to_string()),
        status: Set(crate::models::IntegrationStatus::Connected.as_str().to_string()),
        display_name: Set(display_name),
        access_token_ciphertext: Set(None),
        refresh_token_ciphertext: Set(None),
        expires_at: Set(None),
        scopes: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    state
        .token_store
        .encrypt_for_insert(integration_id, &tuple, &mut model)?;

    let created = state.integrations.create(model).await?;

    info!(
        integration_id = %created.id,
        provider = %provider,
        user_id = %request.user_id,
        "Integration connected"
    );

    Ok((StatusCode::CREATED, Json(IntegrationResponse::from(created))))
}
