//! Service-to-service request signing.
//!
//! Every request forwarded to the AI service carries
//! `HMAC-SHA256(secret, "{timestamp}.{body}")` in hex, computed over the
//! exact bytes that are sent. The AI service recomputes it and checks the
//! timestamp window.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use hmac::{Hmac, Mac};
use portcullis_domain::Environment;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Milliseconds since the Unix epoch at signing time
pub const HEADER_TIMESTAMP: &str = "x-service-timestamp";
/// Hex HMAC signature
pub const HEADER_SIGNATURE: &str = "x-service-signature";
/// Calling service name
pub const HEADER_SERVICE_NAME: &str = "x-service-name";
/// Tenant the request acts for
pub const HEADER_TENANT_ID: &str = "x-tenant-id";
/// User the request acts for
pub const HEADER_USER_ID: &str = "x-user-id";

/// Signature value sent outside production when no secret is configured
pub const UNSIGNED_SIGNATURE: &str = "unsigned-development";

/// Signing failures
#[derive(Debug, Error)]
pub enum SigningError {
    /// No secret configured in production
    #[error("Service signing secret is not configured")]
    MissingSecret,

    /// Secret rejected by the MAC
    #[error("Invalid signing key")]
    InvalidKey,

    /// A context value cannot be sent as a header
    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),
}

/// Compute the hex signature for a timestamp and body
pub fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<String, SigningError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SigningError::InvalidKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature in constant time
pub fn verify(secret: &[u8], timestamp: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Values that identify one forwarded request
#[derive(Debug, Clone)]
pub struct SigningContext<'a> {
    /// Active tenant
    pub tenant_id: &'a str,
    /// Acting user
    pub user_id: &'a str,
    /// Milliseconds since the Unix epoch
    pub timestamp: String,
    /// Exact bytes of the forwarded body
    pub body: &'a [u8],
}

/// Produces the signing headers for forwarded requests
pub struct RequestSigner {
    secret: Option<Vec<u8>>,
    service_name: String,
    environment: Environment,
}

impl RequestSigner {
    /// Create a signer; an empty secret counts as absent
    pub fn new(secret: Option<&str>, service_name: impl Into<String>, environment: Environment) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.as_bytes().to_vec()),
            service_name: service_name.into(),
            environment,
        }
    }

    /// Whether a secret is configured
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Fail if requests cannot be signed in this environment
    pub fn ensure_ready(&self) -> Result<(), SigningError> {
        if self.secret.is_none() && self.environment.is_production() {
            return Err(SigningError::MissingSecret);
        }
        Ok(())
    }

    /// Build the signing headers for a request
    pub fn sign_headers(&self, ctx: &SigningContext<'_>) -> Result<HeaderMap, SigningError> {
        self.ensure_ready()?;

        let signature = match &self.secret {
            Some(secret) => sign(secret, &ctx.timestamp, ctx.body)?,
            None => {
                warn!("Forwarding unsigned request; no service secret configured");
                UNSIGNED_SIGNATURE.to_string()
            }
        };

        let mut headers = HeaderMap::new();
        insert(&mut headers, HEADER_TIMESTAMP, &ctx.timestamp)?;
        insert(&mut headers, HEADER_SIGNATURE, &signature)?;
        insert(&mut headers, HEADER_SERVICE_NAME, &self.service_name)?;
        insert(&mut headers, HEADER_TENANT_ID, ctx.tenant_id)?;
        insert(&mut headers, HEADER_USER_ID, ctx.user_id)?;
        Ok(headers)
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), SigningError> {
    let value = HeaderValue::from_str(value).map_err(|_| SigningError::InvalidHeader(name))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(body: &'a [u8]) -> SigningContext<'a> {
        SigningContext {
            tenant_id: "t1",
            user_id: "u1",
            timestamp: "1700000000000".to_string(),
            body,
        }
    }

    #[test]
    fn test_sign_then_verify() {
        let signature = sign(b"Jefe", "what do ya want", b" for nothing?").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify(b"Jefe", "what do ya want", b" for nothing?", &signature));
    }

    #[test]
    fn test_signature_binds_timestamp_and_body() {
        let body = br#"{"message":"hi"}"#;
        let base = sign(b"secret", "1000", body).unwrap();

        assert_ne!(base, sign(b"secret", "1001", body).unwrap());
        assert_ne!(base, sign(b"secret", "1000", br#"{"message":"ho"}"#).unwrap());
        assert_ne!(base, sign(b"other", "1000", body).unwrap());
    }

    #[test]
    fn test_headers() {
        let signer = RequestSigner::new(Some("secret"), "crm-gateway", Environment::Production);
        let body = br#"{"a":1}"#;
        let headers = signer.sign_headers(&context(body)).unwrap();

        assert_eq!(headers[HEADER_TIMESTAMP], "1700000000000");
        assert_eq!(headers[HEADER_SERVICE_NAME], "crm-gateway");
        assert_eq!(headers[HEADER_TENANT_ID], "t1");
        assert_eq!(headers[HEADER_USER_ID], "u1");

        let signature = headers[HEADER_SIGNATURE].to_str().unwrap();
        assert!(verify(b"secret", "1700000000000", body, signature));
    }

    #[test]
    fn test_missing_secret_in_production_fails_closed() {
        let signer = RequestSigner::new(None, "crm-gateway", Environment::Production);
        assert!(matches!(signer.ensure_ready(), Err(SigningError::MissingSecret)));
        assert!(matches!(
            signer.sign_headers(&context(b"{}")),
            Err(SigningError::MissingSecret)
        ));

        let signer = RequestSigner::new(Some("  "), "crm-gateway", Environment::Production);
        assert!(!signer.is_configured());
        assert!(signer.ensure_ready().is_err());
    }

    #[test]
    fn test_missing_secret_in_development_is_marked() {
        let signer = RequestSigner::new(None, "crm-gateway", Environment::Development);
        let headers = signer.sign_headers(&context(b"{}")).unwrap();
        assert_eq!(headers[HEADER_SIGNATURE], UNSIGNED_SIGNATURE);
    }

    #[test]
    fn test_rejects_header_injection() {
        let signer = RequestSigner::new(Some("secret"), "crm-gateway", Environment::Development);
        let mut ctx = context(b"{}");
        ctx.tenant_id = "t1\r\nx-evil: 1";
        assert!(matches!(
            signer.sign_headers(&ctx),
            Err(SigningError::InvalidHeader(HEADER_TENANT_ID))
        ));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        assert!(!verify(b"secret", "1", b"{}", "zz"));
        assert!(!verify(b"secret", "1", b"{}", ""));
    }
}
