//! # Webhook Security Validation
//!
//! Every inbound webhook passes six stages in order, short-circuiting at
//! the first failure: IP allowlist, rate limit, payload checks, signature
//! and timestamp verification, replay detection, sanitization. Rejections
//! carry full diagnostic detail for the audit log; the HTTP response to
//! the remote caller stays a generic 4xx.

pub mod ip_allowlist;
pub mod nonce;
pub mod payload;
pub mod rate_limit;
pub mod sanitize;
pub mod signature;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::models::Provider;
pub use ip_allowlist::{CidrBlock, CidrParseError, IpAllowlist};
use nonce::NonceCache;
use rate_limit::SlidingWindowLimiter;

/// Why a webhook delivery was refused.
#[derive(Debug, Error)]
pub enum WebhookRejection {
    #[error("source IP {ip} not in provider allowlist")]
    IpNotAllowed { ip: IpAddr },

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("body of {size} bytes exceeds limit of {max}")]
    BodyTooLarge { size: usize, max: usize },

    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("missing required header or field: {header}")]
    SignatureMissing { header: String },

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("timestamp skew of {skew_seconds}s exceeds {max_seconds}s tolerance")]
    TimestampSkew { skew_seconds: u64, max_seconds: u64 },

    #[error("replayed delivery")]
    ReplayDetected,

    #[error("webhooks not supported for provider: {provider}")]
    Unsupported { provider: Provider },

    #[error("webhook verification not configured for provider: {provider}")]
    NotConfigured { provider: Provider },
}

impl WebhookRejection {
    /// HTTP status returned to the remote caller. No rejection detail is
    /// ever included in the response body.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookRejection::IpNotAllowed { .. } => StatusCode::FORBIDDEN,
            WebhookRejection::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            WebhookRejection::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            WebhookRejection::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            WebhookRejection::SignatureMissing { .. } => StatusCode::UNAUTHORIZED,
            WebhookRejection::SignatureInvalid => StatusCode::UNAUTHORIZED,
            WebhookRejection::TimestampSkew { .. } => StatusCode::UNAUTHORIZED,
            WebhookRejection::ReplayDetected => StatusCode::UNAUTHORIZED,
            WebhookRejection::Unsupported { .. } => StatusCode::NOT_FOUND,
            WebhookRejection::NotConfigured { .. } => StatusCode::UNAUTHORIZED,
        }
    }

    /// Audit event kind recorded alongside the rejection.
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookRejection::RateLimited => "rate_limited",
            WebhookRejection::ReplayDetected => "replay_detected",
            _ => "webhook_rejected",
        }
    }
}

/// Stateful validator shared across webhook requests.
pub struct WebhookValidator {
    config: Arc<AppConfig>,
    allowlists: HashMap<Provider, IpAllowlist>,
    rate_limiter: SlidingWindowLimiter,
    nonces: NonceCache,
}

impl WebhookValidator {
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, CidrParseError> {
        let mut allowlists = HashMap::new();
        for (name, blocks) in &config.webhook.ip_allowlists {
            match name.parse::<Provider>() {
                Ok(provider) => {
                    allowlists.insert(provider, IpAllowlist::parse(blocks)?);
                }
                Err(_) => {
                    warn!(provider = %name, "Ignoring IP allowlist for unknown provider");
                }
            }
        }

        let rate_limiter =
            SlidingWindowLimiter::new(Duration::from_secs(config.webhook.rate_window_seconds));
        let nonces = NonceCache::new(Duration::from_secs(config.webhook.nonce_ttl_seconds));

        Ok(Self {
            config,
            allowlists,
            rate_limiter,
            nonces,
        })
    }

    /// Runs all validation stages and returns the sanitized JSON body.
    ///
    /// Google push notifications with empty bodies yield `Value::Null`.
    pub fn validate(
        &self,
        provider: Provider,
        client_ip: IpAddr,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> Result<Value, WebhookRejection> {
        if provider == Provider::Caldav {
            return Err(WebhookRejection::Unsupported { provider });
        }

        if let Some(allowlist) = self.allowlists.get(&provider) {
            if !allowlist.allows(client_ip) {
                return Err(WebhookRejection::IpNotAllowed { ip: client_ip });
            }
        }

        let ceiling = self.config.webhook.rate_limit_for(provider);
        if !self
            .rate_limiter
            .check(provider, &client_ip.to_string(), ceiling)
        {
            return Err(WebhookRejection::RateLimited);
        }

        let body = payload::parse_and_check(provider, raw_body, &self.config.webhook)?;

        self.verify_signature(provider, headers, raw_body, body.as_ref())?;

        for key in nonce::replay_keys(provider, headers, body.as_ref()) {
            if !self.nonces.check_and_record(&key) {
                return Err(WebhookRejection::ReplayDetected);
            }
        }

        debug!(
            provider = %provider,
            client_ip = %client_ip,
            body_size = raw_body.len(),
            "Webhook delivery passed validation"
        );

        Ok(body.map(sanitize::sanitize).unwrap_or(Value::Null))
    }

    fn verify_signature(
        &self,
        provider: Provider,
        headers: &HeaderMap,
        raw_body: &[u8],
        body: Option<&Value>,
    ) -> Result<(), WebhookRejection> {
        match provider {
            Provider::Zoom => match &self.config.webhook_zoom_secret {
                Some(secret) => signature::verify_zoom(
                    raw_body,
                    headers,
                    secret,
                    self.config.webhook.tolerance_seconds,
                ),
                None => self.unconfigured(provider),
            },
            Provider::Google => match &self.config.webhook_google_channel_token {
                Some(token) => signature::verify_google(headers, token),
                None => self.unconfigured(provider),
            },
            Provider::Microsoft => match &self.config.webhook_microsoft_client_state {
                Some(state) => {
                    let body = body.ok_or_else(|| WebhookRejection::MalformedPayload {
                        reason: "empty body".to_string(),
                    })?;
                    signature::verify_microsoft(body, state)
                }
                None => self.unconfigured(provider),
            },
            Provider::Caldav => Err(WebhookRejection::Unsupported { provider }),
        }
    }

    // Unconfigured verification passes only in local and test profiles.
    fn unconfigured(&self, provider: Provider) -> Result<(), WebhookRejection> {
        if matches!(self.config.profile.as_str(), "local" | "test") {
            warn!(
                provider = %provider,
                "Webhook secret not configured; skipping signature verification"
            );
            Ok(())
        } else {
            Err(WebhookRejection::NotConfigured { provider })
        }
    }
}
