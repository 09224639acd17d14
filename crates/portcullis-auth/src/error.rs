//! Error types for the authentication layer.

use thiserror::Error;

/// Secret resolution errors
#[derive(Debug, Error)]
pub enum KeyError {
    /// No secret configured in a production deployment
    #[error("No {0} configured; refusing to start in production without it")]
    MissingInProduction(&'static str),
}

/// Session artifact errors
///
/// Only encoding can fail loudly; decoding resolves to `None`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// JWT encoding failed
    #[error("Failed to encode session: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),

    /// TTL must be positive
    #[error("Session TTL must be greater than zero")]
    InvalidTtl,
}

/// Identity provider communication errors
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Transport failure (DNS, connect, reset)
    #[error("Identity provider unreachable: {0}")]
    Network(String),

    /// Request exceeded the configured timeout
    #[error("Identity provider request timed out")]
    Timeout,

    /// Provider answered with an OAuth error body
    #[error("Identity provider rejected the request ({status}): {error}")]
    Provider {
        /// HTTP status code
        status: u16,
        /// OAuth error code
        error: String,
        /// Optional human readable description
        description: Option<String>,
    },

    /// Provider answered with a non-2xx status and no OAuth error body
    #[error("Identity provider returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Error message extracted from the body, if any
        message: Option<String>,
    },

    /// Response body could not be parsed
    #[error("Invalid identity provider response: {0}")]
    InvalidResponse(String),

    /// URL construction failed
    #[error("Invalid identity provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for IdentityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            IdentityError::Timeout
        } else if e.is_decode() {
            IdentityError::InvalidResponse(e.to_string())
        } else {
            IdentityError::Network(e.to_string())
        }
    }
}

/// Identity claim extraction errors
#[derive(Debug, Error)]
pub enum ClaimsError {
    /// Token is not a three-segment JWS
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Payload segment is not valid base64url
    #[error("Token payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Payload is not the expected JSON claim set
    #[error("Token payload is not a claim set: {0}")]
    Json(#[from] serde_json::Error),

    /// Required claim is missing or empty
    #[error("Token missing required claim: {0}")]
    MissingClaim(&'static str),
}
