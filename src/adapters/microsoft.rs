//! Microsoft Graph adapter
//!
//! Uses the v2.0 endpoints under the `common` tenant and Microsoft Graph for
//! profile data. Microsoft's identity platform exposes no token revocation
//! endpoint for this flow, so revoke is a logged local no-op and the caller
//! clears stored tokens regardless.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::adapters::trait_::{
    AdapterError, AuthorizeParams, ProviderAdapter, UserProfile, classify_error_response,
    http_client, parse_token_response,
};
use crate::crypto::TokenTuple;
use crate::models::Provider;

const DEFAULT_OAUTH_BASE: &str = "https://login.microsoftonline.com";
const DEFAULT_API_BASE: &str = "https://graph.microsoft.com";

const SCOPES: &str = "offline_access Calendars.ReadWrite User.Read";

/// Microsoft Graph provider adapter
pub struct MicrosoftAdapter {
    client_id: String,
    client_secret: String,
    oauth_base: String,
    api_base: String,
    client: reqwest::Client,
}

impl MicrosoftAdapter {
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
            .post(format!("{}/common/oauth2/v2.0/token", self.oauth_base))
            .form(form)
            .send()
            .await?;
        parse_token_response(response).await
    }
}

#[derive(Debug, Deserialize)]
struct GraphUser {
    id: String,
    #[serde(default)]
    mail: Option<String>,
    #[serde(default, rename = "userPrincipalName")]
    user_principal_name: Option<String>,
    #[serde(default, rename = "displayName")]
    display_name: Option<String>,
}

#[async_trait]
impl ProviderAdapter for MicrosoftAdapter {
    fn provider(&self) -> Provider {
        Provider::Microsoft
    }

    fn authorize_url(&self, params: &AuthorizeParams) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&format!(
            "{}/common/oauth2/v2.0/authorize",
            self.oauth_base
        ))
        .map_err(|e| AdapterError::MalformedResponse {
            details: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("response_mode", "query")
            .append_pair("scope", SCOPES)
            .append_pair("state", &params.state);

        debug!(authorize_url = %url, "Generated Microsoft OAuth authorization URL");
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
            ("scope", SCOPES),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenTuple, AdapterError> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("scope", SCOPES),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn revoke(&self, _token: &str) -> Result<(), AdapterError> {
        info!(provider = %Provider::Microsoft, "Provider exposes no revocation endpoint, clearing local tokens only");
        Ok(())
    }

    async fn get_user_profile(&self, access_token: &str) -> Result<UserProfile, AdapterError> {
        let response = self
            .client
            .get(format!("{}/v1.0/me", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_error_response(response).await);
        }

        let user: GraphUser =
            response
                .json()
                .await
                .map_err(|e| AdapterError::MalformedResponse {
                    details: e.to_string(),
                })?;

        Ok(UserProfile {
            id: user.id,
            email: user.mail.or(user.user_principal_name),
            display_name: user.display_name,
        })
    }
}
