//! Error types for the gateway.
//!
//! [`ApiError`] is what request handlers return; it renders the
//! `{error, message}` JSON body with the status for its class. Internal error
//! text is logged, never sent to the client.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use portcullis_auth::IdentityError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine readable error code
    pub error: String,
    /// Human readable message
    pub message: String,
}

/// Request-path failures
#[derive(Debug, Error)]
pub enum ApiError {
    /// Required secret missing in production; fail closed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing, invalid or expired session
    #[error("Authentication required: {0}")]
    Authentication(String),

    /// Cached downstream token could not be refreshed
    #[error("Session expired")]
    TokenRefresh,

    /// Public path has no internal mapping
    #[error("No route for path: {0}")]
    Mapping(String),

    /// Malformed request body or parameters
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Session has no active tenant
    #[error("An active tenant is required")]
    TenantRequired,

    /// Downstream unreachable or timed out
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Downstream answered with an error status
    #[error("Upstream error ({status}): {message}")]
    UpstreamApplication {
        /// Downstream status code
        status: StatusCode,
        /// Message relayed from the downstream body
        message: String,
    },
}

impl ApiError {
    /// Status code and machine code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Configuration(_) => (StatusCode::SERVICE_UNAVAILABLE, "configuration_error"),
            ApiError::Authentication(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::TokenRefresh => (StatusCode::UNAUTHORIZED, "session_expired"),
            ApiError::Mapping(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::TenantRequired => (StatusCode::FORBIDDEN, "tenant_required"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),
            ApiError::UpstreamApplication { status, .. } => (*status, "upstream_error"),
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Configuration(_) => "Service is not configured correctly".to_string(),
            ApiError::Authentication(msg) => msg.clone(),
            ApiError::TokenRefresh => "Session expired, please sign in again".to_string(),
            ApiError::Mapping(_) => "Not found".to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::TenantRequired => "Select or create a business first".to_string(),
            ApiError::Upstream(_) => "AI service is unavailable".to_string(),
            ApiError::UpstreamApplication { message, .. } => message.clone(),
        }
    }

    /// Shorthand for the missing/invalid session case
    pub fn unauthenticated() -> Self {
        ApiError::Authentication("Authentication required".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.public_message(),
        });
        (status, body).into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        warn!(error = %e, "Identity provider call failed");
        match e {
            IdentityError::Provider {
                status,
                error,
                description,
            } => ApiError::UpstreamApplication {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                message: description.unwrap_or(error),
            },
            IdentityError::Status { status, message } => ApiError::UpstreamApplication {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                message: message.unwrap_or_else(|| "Identity service request failed".to_string()),
            },
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

/// Startup failures
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Identity client construction failed
    #[error("Identity client error: {0}")]
    Identity(#[from] IdentityError),

    /// Downstream HTTP client construction failed
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Server binding error
    #[error("Failed to bind server: {0}")]
    Bind(#[from] std::io::Error),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Configuration("x".into()).status_and_code().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::unauthenticated().status_and_code().0, StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::TokenRefresh.status_and_code(), (StatusCode::UNAUTHORIZED, "session_expired"));
        assert_eq!(ApiError::Mapping("x".into()).status_and_code().0, StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Upstream("x".into()).status_and_code().0, StatusCode::BAD_GATEWAY);

        let relayed = ApiError::UpstreamApplication {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "bad".into(),
        };
        assert_eq!(relayed.status_and_code(), (StatusCode::UNPROCESSABLE_ENTITY, "upstream_error"));
    }

    #[test]
    fn test_internal_details_not_exposed() {
        let err = ApiError::Upstream("connection refused at 10.0.0.7:8000".into());
        assert_eq!(err.public_message(), "AI service is unavailable");

        let err = ApiError::Configuration("signing.secret missing".into());
        assert!(!err.public_message().contains("signing"));
    }

    #[test]
    fn test_identity_error_mapping() {
        let err: ApiError = IdentityError::Timeout.into();
        assert!(matches!(err, ApiError::Upstream(_)));

        let err: ApiError = IdentityError::Status {
            status: 403,
            message: Some("Not a member".into()),
        }
        .into();
        match err {
            ApiError::UpstreamApplication { status, message } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(message, "Not a member");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
