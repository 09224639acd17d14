//! Identity claim extraction from provider-issued access tokens.
//!
//! This reads the JWT payload without verifying its signature. The token came
//! straight from the provider's token endpoint over TLS in exchange for a
//! one-time code, so integrity rests on that channel. The extracted claims
//! only seed a locally signed [`SessionClaims`], which is what later requests
//! verify.

use crate::error::ClaimsError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use portcullis_domain::{SessionClaims, TokenGrant};
use serde::Deserialize;

/// Role assigned when the provider does not supply one
pub const DEFAULT_ROLE: &str = "member";

/// Claims the login flow reads from the provider's access token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityClaims {
    /// Subject (user id)
    pub sub: String,

    /// Email address
    #[serde(default)]
    pub email: String,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Active tenant
    #[serde(default, alias = "tenantId")]
    pub tenant_id: Option<String>,

    /// Role within the tenant
    #[serde(default)]
    pub role: Option<String>,

    /// Granted permissions
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Expiry (Unix epoch seconds)
    #[serde(default)]
    pub exp: Option<u64>,
}

impl IdentityClaims {
    /// Role, defaulting to [`DEFAULT_ROLE`]
    pub fn role_or_default(&self) -> &str {
        self.role
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ROLE)
    }

    /// Build session claims for these identity claims and the grant they came from
    ///
    /// Onboarding state follows the tenant claim.
    pub fn into_session_claims(self, grant: &TokenGrant) -> SessionClaims {
        let role = self.role_or_default().to_string();
        SessionClaims::new(self.sub, self.email, role, grant.access_token.clone())
            .with_tenant(self.tenant_id)
            .with_refresh_token(grant.refresh_token.clone())
            .with_display_name(self.name)
            .with_permissions(self.permissions)
    }
}

/// Extract claims from a JWT without verifying the signature
pub fn extract_claims(token: &str) -> Result<IdentityClaims, ClaimsError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(ClaimsError::Malformed(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    }

    let payload = URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('='))?;
    let claims: IdentityClaims = serde_json::from_slice(&payload)?;

    if claims.sub.trim().is_empty() {
        return Err(ClaimsError::MissingClaim("sub"));
    }

    Ok(claims)
}
