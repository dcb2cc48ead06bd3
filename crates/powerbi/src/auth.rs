//! Azure AD client-credentials token client.
//!
//! [`AzureAdTokenClient`] implements [`TokenProvider`] so the credential
//! store can refresh an expired bearer token without knowing about HTTP.

use pbx_core::credentials::{CredentialError, TokenProvider};
use serde::Deserialize;

/// Default Microsoft identity platform authority.
pub const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";

/// Scope granting access to the Power BI REST API.
pub const POWERBI_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";

const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token endpoint error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Requests application tokens from the identity provider.
pub struct AzureAdTokenClient {
    client: reqwest::Client,
    authority_url: String,
    scope: String,
}

impl AzureAdTokenClient {
    pub fn new(authority_url: String, scope: String) -> Self {
        Self::with_client(reqwest::Client::new(), authority_url, scope)
    }

    pub fn with_client(client: reqwest::Client, authority_url: String, scope: String) -> Self {
        Self {
            client,
            authority_url: authority_url.trim_end_matches('/').to_string(),
            scope,
        }
    }

    /// `{authority}/{tenant}/oauth2/v2.0/token`
    pub fn token_url(&self, tenant_id: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_url, tenant_id)
    }

    /// Perform the client-credentials grant and return the access token.
    pub async fn request_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, AuthError> {
        let form = [
            ("grant_type", GRANT_TYPE_CLIENT_CREDENTIALS),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .client
            .post(self.token_url(tenant_id))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AuthError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let token = response.json::<TokenResponse>().await?;
        tracing::debug!(tenant_id, "Access token issued");
        Ok(token.access_token)
    }
}

impl Default for AzureAdTokenClient {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHORITY_URL.to_string(), POWERBI_SCOPE.to_string())
    }
}

#[async_trait::async_trait]
impl TokenProvider for AzureAdTokenClient {
    async fn fetch_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, CredentialError> {
        self.request_token(tenant_id, client_id, client_secret)
            .await
            .map_err(|e| CredentialError::TokenRequest(e.to_string()))
    }
}
