//! SSO authorization-code exchange.
//!
//! The callback moves through [`ExchangeStage`]s in order. Each stage either
//! hands off to the next or ends in a [`LoginFailure`] that sends the browser
//! back to the login page with an error code. Only a completed exchange sets
//! the session cookie.

use crate::config::RedirectConfig;
use crate::cookies::session_cookie;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use portcullis_auth::{extract_claims, IdentityError, IdentityProvider, SessionCodec};
use portcullis_domain::{SessionClaims, TokenGrant};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use url::form_urlencoded;

/// Provider returned no code and no error
pub const ERROR_MISSING_CODE: &str = "missing_code";
/// Code exchange failed without a provider error code
pub const ERROR_TOKEN_EXCHANGE_FAILED: &str = "token_exchange_failed";
/// Access token could not be read
pub const ERROR_INVALID_TOKEN: &str = "invalid_token";
/// Session artifact could not be minted
pub const ERROR_SESSION: &str = "session_error";

/// Query parameters on the callback URL
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// Opaque state round-tripped through the provider
    pub state: Option<String>,
    /// Provider error code
    pub error: Option<String>,
    /// Provider error description
    pub error_description: Option<String>,
}

/// Stages of the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStage {
    /// Checking for a code or provider error
    AwaitingCode,
    /// Calling the token endpoint
    ExchangingCode,
    /// Reading claims from the access token
    DecodingClaims,
    /// Signing the session artifact
    MintingSession,
    /// Choosing where the browser goes next
    Redirecting,
}

/// A failed login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginFailure {
    /// Stage that failed
    pub stage: ExchangeStage,
    /// Error code for the login page
    pub code: String,
    /// Optional description for the login page
    pub description: Option<String>,
}

impl LoginFailure {
    fn new(stage: ExchangeStage, code: impl Into<String>) -> Self {
        Self {
            stage,
            code: code.into(),
            description: None,
        }
    }

    fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }

    /// Login page URL carrying this failure
    pub fn login_redirect(&self, login_path: &str) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("error", &self.code);
        if let Some(description) = &self.description {
            query.append_pair("error_description", description);
        }
        format!("{}?{}", login_path, query.finish())
    }
}

/// A completed login
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    /// Where the browser goes next
    pub location: String,
    /// `Set-Cookie` value with the new session
    pub set_cookie: String,
    /// Claims inside the session
    pub claims: SessionClaims,
    /// Grant from the provider, used to seed the token cache
    pub grant: TokenGrant,
}

/// State carried through the provider round trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    /// Post-login destination
    pub redirect: String,
}

/// Encode a post-login destination as a state parameter
pub fn encode_state(redirect: &str) -> Option<String> {
    let state = LoginState {
        redirect: redirect.to_string(),
    };
    serde_json::to_vec(&state)
        .ok()
        .map(|json| URL_SAFE_NO_PAD.encode(json))
}

/// Read a safe post-login destination from a state parameter
pub fn decode_state_redirect(state: &str) -> Option<String> {
    let trimmed = state.trim().trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD.decode(state.trim()))
        .ok()?;
    let state: LoginState = serde_json::from_slice(&bytes).ok()?;
    is_safe_redirect(&state.redirect).then_some(state.redirect)
}

/// Whether a redirect stays on this site
pub fn is_safe_redirect(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.starts_with("/\\")
        && !path.chars().any(char::is_control)
}

/// Everything the callback needs besides the request
pub struct SsoExchange<'a> {
    /// Token endpoint client
    pub identity: &'a dyn IdentityProvider,
    /// Session signer
    pub codec: &'a SessionCodec,
    /// Redirect URI registered with the provider
    pub redirect_uri: &'a str,
    /// Redirect targets
    pub redirects: &'a RedirectConfig,
    /// Session cookie name
    pub cookie_name: &'a str,
    /// Session lifetime
    pub ttl: Duration,
    /// Mark the cookie `Secure`
    pub secure_cookie: bool,
}

impl SsoExchange<'_> {
    /// Run the callback to completion
    pub async fn run(&self, params: CallbackParams) -> Result<LoginSuccess, LoginFailure> {
        let code = self.await_code(&params)?;
        let grant = self.exchange(&code).await?;
        let claims = self.decode_claims(&grant)?;
        let artifact = self.mint(&claims)?;
        let location = self.destination(&params, &claims);

        info!(user_id = %claims.user_id, tenant = ?claims.tenant_id, "SSO login completed");

        Ok(LoginSuccess {
            location,
            set_cookie: session_cookie(
                self.cookie_name,
                &artifact,
                self.ttl.as_secs(),
                self.secure_cookie,
            ),
            claims,
            grant,
        })
    }

    fn await_code(&self, params: &CallbackParams) -> Result<String, LoginFailure> {
        if let Some(error) = params.error.as_deref().filter(|e| !e.is_empty()) {
            warn!(error = %error, "Identity provider returned an error");
            return Err(LoginFailure::new(ExchangeStage::AwaitingCode, error)
                .with_description(params.error_description.clone()));
        }
        params
            .code
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| LoginFailure::new(ExchangeStage::AwaitingCode, ERROR_MISSING_CODE))
    }

    async fn exchange(&self, code: &str) -> Result<TokenGrant, LoginFailure> {
        self.identity
            .exchange_code(code, self.redirect_uri)
            .await
            .map_err(|e| {
                warn!(error = %e, "Authorization code exchange failed");
                match e {
                    IdentityError::Provider {
                        error, description, ..
                    } => LoginFailure::new(ExchangeStage::ExchangingCode, error)
                        .with_description(description),
                    _ => LoginFailure::new(ExchangeStage::ExchangingCode, ERROR_TOKEN_EXCHANGE_FAILED),
                }
            })
    }

    fn decode_claims(&self, grant: &TokenGrant) -> Result<SessionClaims, LoginFailure> {
        extract_claims(&grant.access_token)
            .map(|identity| identity.into_session_claims(grant))
            .map_err(|e| {
                warn!(error = %e, "Could not read claims from access token");
                LoginFailure::new(ExchangeStage::DecodingClaims, ERROR_INVALID_TOKEN)
            })
    }

    fn mint(&self, claims: &SessionClaims) -> Result<String, LoginFailure> {
        self.codec.encode(claims, self.ttl).map_err(|e| {
            warn!(error = %e, "Failed to mint session");
            LoginFailure::new(ExchangeStage::MintingSession, ERROR_SESSION)
        })
    }

    fn destination(&self, params: &CallbackParams, claims: &SessionClaims) -> String {
        if let Some(redirect) = params.state.as_deref().and_then(decode_state_redirect) {
            return redirect;
        }
        if claims.requires_onboarding {
            return self.redirects.onboarding_path.clone();
        }
        self.redirects.landing_path.clone()
    }
}
