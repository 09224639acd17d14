//! Downstream token types

use serde::{Deserialize, Serialize};

/// Token endpoint response from the identity provider (OAuth2 shape)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Access token
    pub access_token: String,

    /// Refresh token, if the provider rotated or issued one
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: u64,

    /// Token type, normally `Bearer`
    #[serde(default)]
    pub token_type: Option<String>,

    /// OpenID Connect ID token, if requested
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Access/refresh pair held by the token cache
///
/// Lives in process memory only; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Bearer token for downstream calls
    pub access_token: String,

    /// Refresh token used to obtain the next pair
    pub refresh_token: String,

    /// Absolute expiry (Unix epoch seconds)
    pub expires_at: u64,

    /// Lifetime granted at issuance (seconds)
    pub expires_in: u64,
}

impl TokenPair {
    /// Build a pair from a token endpoint response received at `now` (epoch seconds)
    ///
    /// Providers that do not rotate refresh tokens omit them on refresh, so
    /// `previous_refresh` is carried over. Returns `None` when no refresh
    /// token is available at all.
    pub fn from_grant(grant: TokenGrant, now: u64, previous_refresh: Option<&str>) -> Option<Self> {
        let refresh_token = grant
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous_refresh.map(str::to_string))?;

        Some(Self {
            access_token: grant.access_token,
            refresh_token,
            expires_at: now.saturating_add(grant.expires_in),
            expires_in: grant.expires_in,
        })
    }

    /// Whether the access token expires within `buffer_secs` of `now`
    pub fn expires_within(&self, now: u64, buffer_secs: u64) -> bool {
        now.saturating_add(buffer_secs) >= self.expires_at
    }
}
