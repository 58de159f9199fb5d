//! # Webhook Handlers
//!
//! Public endpoints receiving provider push notifications. Authentication
//! happens through the validation pipeline, not operator tokens; rejected
//! deliveries get a generic 4xx with no diagnostic body.

use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::handlers::connect::{ProviderPath, parse_provider};
use crate::models::{Provider, security_event};
use crate::server::AppState;
use crate::webhook::WebhookRejection;

/// Query parameters for webhook deliveries
#[derive(Debug, Deserialize, IntoParams)]
pub struct WebhookQuery {
    /// Microsoft Graph subscription handshake token, echoed back verbatim
    #[serde(rename = "validationToken")]
    pub validation_token: Option<String>,
}

/// Webhook accept response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAcceptResponse {
    /// Acceptance status
    pub status: String,
}

/// Resolves the client address, preferring the first `X-Forwarded-For`
/// entry over the socket peer when a proxy sits in front.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|forwarded| forwarded.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .unwrap_or_else(|| peer.ip())
}

/// Receive a provider webhook delivery
///
/// Runs the delivery through the validation pipeline. Microsoft Graph's
/// subscription handshake (a `validationToken` query parameter) is echoed
/// back as plain text before any validation, per the Graph contract.
#[utoipa::path(
    post,
    path = "/webhooks/{provider}",
    params(ProviderPath, WebhookQuery),
    responses(
        (status = 202, description = "Delivery accepted", body = WebhookAcceptResponse),
        (status = 200, description = "Subscription handshake echoed"),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Signature, timestamp, or replay rejection"),
        (status = 403, description = "Source IP not allowed"),
        (status = 404, description = "Unknown provider"),
        (status = 413, description = "Body too large"),
        (status = 429, description = "Rate limit exceeded")
    ),
    tag = "webhooks"
)]
pub async fn receive(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(path): Path<ProviderPath>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provider = match parse_provider(&path.provider) {
        Ok(provider) => provider,
        Err(e) => return e.into_response(),
    };

    if provider == Provider::Microsoft {
        if let Some(token) = query.validation_token {
            info!("Answering Microsoft Graph subscription handshake");
            return (
                StatusCode::OK,
                [("content-type", "text/plain")],
                token,
            )
                .into_response();
        }
    }

    let ip = client_ip(&headers, peer);

    match state.validator.validate(provider, ip, &headers, &body) {
        Ok(payload) => {
            info!(
                provider = %provider,
                client_ip = %ip,
                body_size = body.len(),
                "Webhook delivery accepted"
            );
            record_event(&state, provider, "webhook_accepted", ip, None).await;

            // Downstream scheduling consumes the sanitized payload; this
            // service's responsibility ends at validated hand-off.
            let _ = payload;

            (
                StatusCode::ACCEPTED,
                Json(WebhookAcceptResponse {
                    status: "accepted".to_string(),
                }),
            )
                .into_response()
        }
        Err(rejection) => {
            warn!(
                provider = %provider,
                client_ip = %ip,
                reason = %rejection,
                "Webhook delivery rejected"
            );
            record_event(
                &state,
                provider,
                rejection.kind(),
                ip,
                Some(rejection.to_string()),
            )
            .await;

            let mut response = rejection.status_code().into_response();
            if let WebhookRejection::RateLimited = rejection {
                if let Ok(value) = state.config.webhook.rate_window_seconds.to_string().parse() {
                    response.headers_mut().insert("retry-after", value);
                }
            }
            response
        }
    }
}

async fn record_event(
    state: &AppState,
    provider: Provider,
    kind: &str,
    ip: IpAddr,
    reason: Option<String>,
) {
    if let Err(e) = state
        .security_events
        .record(provider, kind, Some(ip.to_string()), reason, None)
        .await
    {
        warn!(error = ?e, "Failed to record webhook audit event");
    }
}

/// Security event representation exposed over the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SecurityEventResponse {
    pub id: Uuid,
    pub provider: String,
    /// Event kind (webhook_rejected, rate_limited, replay_detected, ...)
    pub kind: String,
    pub client_ip: Option<String>,
    pub reason: Option<String>,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<security_event::Model> for SecurityEventResponse {
    fn from(model: security_event::Model) -> Self {
        Self {
            id: model.id,
            provider: model.provider,
            kind: model.kind,
            client_ip: model.client_ip,
            reason: model.reason,
            detail: model.detail,
            created_at: model.created_at.into(),
        }
    }
}

/// Query parameters for listing security events
#[derive(Debug, Deserialize, IntoParams)]
pub struct SecurityEventQuery {
    /// Restrict to one provider
    pub provider: Option<String>,
    /// Maximum number of events to return (default 100)
    pub limit: Option<u64>,
}

/// List recent security events
#[utoipa::path(
    get,
    path = "/security-events",
    security(("bearer_auth" = [])),
    params(SecurityEventQuery),
    responses(
        (status = 200, description = "Recent security events", body = [SecurityEventResponse]),
        (status = 401, description = "Missing or invalid operator token", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn list_security_events(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(query): Query<SecurityEventQuery>,
) -> Result<Json<Vec<SecurityEventResponse>>, ApiError> {
    let provider = query
        .provider
        .as_deref()
        .map(parse_provider)
        .transpose()?;
    let limit = query.limit.unwrap_or(100).min(1000);

    let events = state.security_events.list_recent(provider, limit).await?;
    Ok(Json(
        events.into_iter().map(SecurityEventResponse::from).collect(),
    ))
}
