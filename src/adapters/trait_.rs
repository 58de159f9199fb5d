//! Provider adapter trait definition
//!
//! Defines the standard interface all provider adapters implement, plus the
//! shared OAuth response handling used by every concrete adapter.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::crypto::TokenTuple;
use crate::models::Provider;

/// Adapter error types for structured classification.
///
/// The refresh coordinator decides terminal vs retryable from these
/// variants, so classification lives here rather than in string matching
/// at the call site.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Transport-level failure (DNS, connect, timeout). Retryable.
    #[error("network error: {details}")]
    Network { details: String },
    /// Provider answered with a 4xx. Terminal for the attempted operation.
    #[error("provider rejected request with status {status}")]
    ProviderRejected {
        status: u16,
        error_code: Option<String>,
        body: Option<String>,
    },
    /// Provider answered with a 5xx. Retryable.
    #[error("provider unavailable (status {status})")]
    ProviderUnavailable { status: u16 },
    /// Provider answered 2xx but the body did not parse.
    #[error("malformed provider response: {details}")]
    MalformedResponse { details: String },
    /// The provider has no equivalent of the requested operation.
    #[error("operation '{operation}' is not supported by this provider")]
    NotSupported { operation: &'static str },
}

impl AdapterError {
    /// Whether retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::Network { .. } | AdapterError::ProviderUnavailable { .. }
        )
    }

    /// Whether the provider reported the grant itself as dead. The caller
    /// must stop retrying and require re-authorization.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(
            self,
            AdapterError::ProviderRejected {
                error_code: Some(code),
                ..
            } if code == "invalid_grant"
        )
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(error: reqwest::Error) -> Self {
        AdapterError::Network {
            details: error.to_string(),
        }
    }
}

/// Basic identity fields common to all providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Parameters for building an authorization URL.
#[derive(Debug, Clone)]
pub struct AuthorizeParams {
    pub redirect_uri: String,
    pub state: String,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider this adapter serves.
    fn provider(&self) -> Provider;

    /// Build the user-facing authorization URL for this provider.
    fn authorize_url(&self, params: &AuthorizeParams) -> Result<Url, AdapterError>;

    /// Exchange an authorization code for a token tuple.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenTuple, AdapterError>;

    /// Obtain a fresh access token from a refresh token.
    ///
    /// Providers that do not rotate refresh tokens leave
    /// `TokenTuple::refresh_token` empty; callers keep the previous one.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenTuple, AdapterError>;

    /// Revoke a token at the provider.
    async fn revoke(&self, token: &str) -> Result<(), AdapterError>;

    /// Fetch the authenticated user's profile.
    async fn get_user_profile(&self, access_token: &str) -> Result<UserProfile, AdapterError>;
}

/// Shared HTTP client with bounded timeouts for all adapters.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .expect("reqwest client construction is infallible with static options")
}

/// Standard OAuth token endpoint response shared by all three providers.
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
}

impl OAuthTokenResponse {
    /// Convert `expires_in` seconds into an absolute expiry instant.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|seconds| Utc::now() + ChronoDuration::seconds(seconds))
    }

    /// Split the provider's space-delimited scope string.
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(split_scopes)
            .unwrap_or_default()
    }

    pub fn into_tuple(self) -> TokenTuple {
        let expires_at = self.expires_at();
        let scopes = self.scopes();
        TokenTuple {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            scopes,
        }
    }
}

pub(crate) fn split_scopes(scope: &str) -> Vec<String> {
    scope
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Classify a non-success token endpoint response.
pub(crate) async fn classify_error_response(response: reqwest::Response) -> AdapterError {
    let status = response.status().as_u16();
    if response.status().is_server_error() {
        return AdapterError::ProviderUnavailable { status };
    }

    let body = response.text().await.unwrap_or_default();
    let error_code = serde_json::from_str::<OAuthErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.error);

    AdapterError::ProviderRejected {
        status,
        error_code,
        body: if body.is_empty() { None } else { Some(body) },
    }
}

/// Parse a successful token endpoint response into a token tuple.
pub(crate) async fn parse_token_response(
    response: reqwest::Response,
) -> Result<TokenTuple, AdapterError> {
    if !response.status().is_success() {
        return Err(classify_error_response(response).await);
    }

    let parsed: OAuthTokenResponse =
        response
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse {
                details: e.to_string(),
            })?;

    if parsed.access_token.is_empty() {
        return Err(AdapterError::MalformedResponse {
            details: "token response carried an empty access_token".to_string(),
        });
    }

    Ok(parsed.into_tuple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let network = AdapterError::Network {
            details: "connection refused".to_string(),
        };
        assert!(network.is_retryable());
        assert!(!network.is_invalid_grant());

        let unavailable = AdapterError::ProviderUnavailable { status: 503 };
        assert!(unavailable.is_retryable());

        let rejected = AdapterError::ProviderRejected {
            status: 400,
            error_code: Some("invalid_grant".to_string()),
            body: None,
        };
        assert!(!rejected.is_retryable());
        assert!(rejected.is_invalid_grant());

        let other_rejection = AdapterError::ProviderRejected {
            status: 400,
            error_code: Some("invalid_client".to_string()),
            body: None,
        };
        assert!(!other_rejection.is_invalid_grant());
    }

    #[test]
    fn test_scope_splitting() {
        assert_eq!(
            split_scopes("openid email  profile"),
            vec!["openid", "email", "profile"]
        );
        assert!(split_scopes("").is_empty());
    }

    #[test]
    fn test_expires_at_is_absolute() {
        let response = OAuthTokenResponse {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            scope: None,
        };

        let expires_at = response.expires_at().expect("expiry present");
        let delta = expires_at - Utc::now();
        assert!(delta.num_seconds() > 3590 && delta.num_seconds() <= 3600);

        let no_expiry = OAuthTokenResponse {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_in: None,
            scope: None,
        };
        assert!(no_expiry.expires_at().is_none());
    }
}
