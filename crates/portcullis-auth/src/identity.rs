//! Identity provider client
//!
//! Talks to the OAuth2 token endpoint for the authorization-code exchange and
//! refresh grants, and to the tenant-switch endpoint. All calls are bounded by
//! the configured timeout.
//!
//! # Examples
//!
//! ```no_run
//! use portcullis_auth::identity::{HttpIdentityProvider, IdentityClientConfig};
//!
//! let provider = HttpIdentityProvider::new(IdentityClientConfig::new(
//!     "https://id.example.com",
//!     "crm-web",
//! ))
//! .unwrap();
//! ```

use crate::error::IdentityError;
use crate::token_cache::TokenRefresher;
use async_trait::async_trait;
use portcullis_domain::TokenGrant;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default timeout for identity provider requests (10 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Identity provider calls used by the login and tenant-switch flows
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an authorization code for tokens
    ///
    /// `redirect_uri` must equal the one sent in the authorization request.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, IdentityError>;

    /// Obtain tokens scoped to another tenant
    async fn switch_tenant(&self, access_token: &str, tenant_id: &str) -> Result<TokenGrant, IdentityError>;
}

/// Connection settings for [`HttpIdentityProvider`]
#[derive(Debug, Clone)]
pub struct IdentityClientConfig {
    /// Provider base URL (e.g., "https://id.example.com")
    pub base_url: String,

    /// OAuth client identifier
    pub client_id: String,

    /// OAuth client secret for confidential clients
    pub client_secret: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl IdentityClientConfig {
    /// Public client with the default timeout
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the client secret
    pub fn with_client_secret(mut self, client_secret: Option<String>) -> Self {
        self.client_secret = client_secret.filter(|s| !s.is_empty());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// OAuth error body (RFC 6749 §5.2)
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Generic `{message}` error body used by the identity service's own endpoints
#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SwitchTenantRequest<'a> {
    tenant_id: &'a str,
}

/// HTTP implementation of the identity provider contract
pub struct HttpIdentityProvider {
    config: IdentityClientConfig,
    client: reqwest::Client,
}

impl HttpIdentityProvider {
    /// Create a client for the given provider
    pub fn new(config: IdentityClientConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IdentityError::Client(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Token endpoint URL
    pub fn token_url(&self) -> String {
        self.endpoint("oauth2/token")
    }

    /// Build the authorization URL the browser is redirected to at login
    pub fn authorize_url(
        &self,
        redirect_uri: &str,
        scope: &str,
        state: Option<&str>,
    ) -> Result<Url, IdentityError> {
        let mut url = Url::parse(&self.endpoint("oauth2/authorize"))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("scope", scope);
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }

    async fn post_token_form(&self, grant: &[(&str, &str)]) -> Result<TokenGrant, IdentityError> {
        let mut form: Vec<(&str, &str)> = grant.to_vec();
        form.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.client.post(self.token_url()).form(&form).send().await?;
        read_grant(response).await
    }
}

/// Turn a token endpoint response into a grant or a typed error
async fn read_grant(response: reqwest::Response) -> Result<TokenGrant, IdentityError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<TokenGrant>()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "Identity provider returned an error status");

    if let Ok(oauth) = serde_json::from_str::<OAuthErrorBody>(&body) {
        return Err(IdentityError::Provider {
            status: status.as_u16(),
            error: oauth.error,
            description: oauth.error_description,
        });
    }

    Err(IdentityError::Status {
        status: status.as_u16(),
        message: serde_json::from_str::<MessageBody>(&body).ok().map(|b| b.message),
    })
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, IdentityError> {
        self.post_token_form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn switch_tenant(&self, access_token: &str, tenant_id: &str) -> Result<TokenGrant, IdentityError> {
        let response = self
            .client
            .post(self.endpoint("auth/switch-tenant"))
            .bearer_auth(access_token)
            .json(&SwitchTenantRequest { tenant_id })
            .send()
            .await?;
        read_grant(response).await
    }
}

#[async_trait]
impl TokenRefresher for HttpIdentityProvider {
    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenGrant, IdentityError> {
        self.post_token_form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> HttpIdentityProvider {
        HttpIdentityProvider::new(
            IdentityClientConfig::new("https://id.example.com/", "crm-web")
                .with_client_secret(Some("s3cret".to_string())),
        )
        .unwrap()
    }

    #[test]
    fn test_token_url_trims_slash() {
        assert_eq!(provider().token_url(), "https://id.example.com/oauth2/token");
    }

    #[test]
    fn test_authorize_url() {
        let url = provider()
            .authorize_url("https://crm.example.com/auth/callback/sso", "openid email", Some("abc"))
            .unwrap();

        assert_eq!(url.path(), "/oauth2/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("client_id".to_string(), "crm-web".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "https://crm.example.com/auth/callback/sso".to_string()
        )));
        assert!(pairs.contains(&("state".to_string(), "abc".to_string())));
    }

    #[test]
    fn test_empty_client_secret_is_absent() {
        let config = IdentityClientConfig::new("https://id.example.com", "crm-web")
            .with_client_secret(Some(String::new()));
        assert!(config.client_secret.is_none());
    }
}
