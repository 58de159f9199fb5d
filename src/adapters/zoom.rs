//! Zoom adapter
//!
//! Zoom authenticates token endpoint calls with HTTP Basic client
//! credentials rather than form fields, and rotates the refresh token on
//! every refresh, so refresh responses here always carry a replacement.

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

const DEFAULT_OAUTH_BASE: &str = "https://zoom.us";
const DEFAULT_API_BASE: &str = "https://api.zoom.us";

/// Zoom provider adapter
pub struct ZoomAdapter {
    client_id: String,
    client_secret: String,
    oauth_base: String,
    api_base: String,
    client: reqwest::Client,
}

impl ZoomAdapter {
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
            .post(format!("{}/oauth/token", self.oauth_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;
        parse_token_response(response).await
    }
}

#[derive(Debug, Deserialize)]
struct ZoomUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

impl ZoomUser {
    fn resolved_display_name(&self) -> Option<String> {
        if self.display_name.is_some() {
            return self.display_name.clone();
        }
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }
}

#[async_trait]
impl ProviderAdapter for ZoomAdapter {
    fn provider(&self) -> Provider {
        Provider::Zoom
    }

    fn authorize_url(&self, params: &AuthorizeParams) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&format!("{}/oauth/authorize", self.oauth_base)).map_err(|e| {
            AdapterError::MalformedResponse {
                details: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("state", &params.state);

        debug!(authorize_url = %url, "Generated Zoom OAuth authorization URL");
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenTuple, AdapterError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenTuple, AdapterError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn revoke(&self, token: &str) -> Result<(), AdapterError> {
        let response = self
            .client
            .post(format!("{}/oauth/revoke", self.oauth_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
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
            .get(format!("{}/v2/users/me", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let user: ZoomUser =
            response
                .json()
                .await
                .map_err(|e| AdapterError::MalformedResponse {
                    details: e.to_string(),
                })?;

        let display_name = user.resolved_display_name();
        Ok(UserProfile {
            id: user.id,
            email: user.email,
            display_name,
        })
    }
}
