//! Google Calendar adapter
//!
//! Token endpoints live on `oauth2.googleapis.com`, the consent screen on
//! `accounts.google.com`, and the profile endpoint on
//! `openidconnect.googleapis.com`. Google does not rotate refresh tokens on
//! refresh, so refresh responses leave the refresh token empty.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::adapters::trait_::{
    AdapterError, AuthorizeParams, ProviderAdapter, UserProfile, classify_error_response,
    http_client, parse_token_response,
};
use crate::crypto::TokenTuple;
use crate::models::Provider;

const ACCOUNTS_BASE: &str = "https://accounts.google.com";
const DEFAULT_OAUTH_BASE: &str = "https://oauth2.googleapis.com";
const DEFAULT_API_BASE: &str = "https://openidconnect.googleapis.com";

const SCOPES: &str = "https://www.googleapis.com/auth/calendar openid email profile";

/// Google Calendar provider adapter
pub struct GoogleAdapter {
    client_id: String,
    client_secret: String,
    oauth_base: String,
    api_base: String,
    client: reqwest::Client,
}

impl GoogleAdapter {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self::with_bases(
            client_id,
            client_secret,
            DEFAULT_OAUTH_BASE.to_string(),
            DEFAULT_API_BASE.to_string(),
        )
    }

    /// Constructor with endpoint overrides, used for wiring mock servers.
    pub fn with_bases(
        client_id: String,
        client_secret: String,
        oauth_base: String,
        api_base: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            oauth_base,
            api_base,
            client: http_client(),
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenTuple, AdapterError> {
        let response = self
            .client
            .post(format!("{}/token", self.oauth_base))
            .form(form)
            .send()
            .await?;
        parse_token_response(response).await
    }
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn authorize_url(&self, params: &AuthorizeParams) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&format!("{}/o/oauth2/v2/auth", ACCOUNTS_BASE)).map_err(|e| {
            AdapterError::MalformedResponse {
                details: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &params.state);

        debug!(authorize_url = %url, "Generated Google OAuth authorization URL");
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenTuple, AdapterError> {
        self.token_request(&[
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenTuple, AdapterError> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn revoke(&self, token: &str) -> Result<(), AdapterError> {
        let response = self
            .client
            .post(format!("{}/revoke", self.oauth_base))
            .form(&[("token", token)])
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(classify_error_response(response).await)
        }
    }

    async fn get_user_profile(&self, access_token: &str) -> Result<UserProfile, AdapterError> {
        let response = self
            .client
            .get(format!("{}/v1/userinfo", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let info: GoogleUserInfo =
            response
                .json()
                .await
                .map_err(|e| AdapterError::MalformedResponse {
                    details: e.to_string(),
                })?;

        Ok(UserProfile {
            id: info.sub,
            email: info.email,
            display_name: info.name,
        })
    }
}
