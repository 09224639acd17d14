//! Session-signing key resolution.
//!
//! Order: explicitly configured secret, then the platform-provided binding,
//! then (outside production only) a well-known development key.

use crate::error::KeyError;
use portcullis_domain::Environment;
use std::fmt;
use tracing::warn;

/// Development-only session key. Anyone can forge sessions signed with it.
pub const DEVELOPMENT_SESSION_KEY: &str = "portcullis-development-session-key-do-not-use-in-production";

/// Where the resolved key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Configured secret (config file or `PORTCULLIS_SESSION_SECRET`)
    Explicit,
    /// Secret bound by the hosting platform
    Platform,
    /// Built-in development key
    DevelopmentFallback,
}

/// A resolved session-signing key
#[derive(Clone)]
pub struct ResolvedKey {
    secret: String,
    source: KeySource,
}

impl ResolvedKey {
    /// Secret bytes
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Origin of the secret
    pub fn source(&self) -> KeySource {
        self.source
    }
}

impl fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("secret", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Resolve the session-signing key
///
/// Empty strings count as absent. In production, absence of both secrets is
/// an error; elsewhere the development key is used and a warning is logged.
pub fn resolve_session_key(
    explicit: Option<&str>,
    platform: Option<&str>,
    environment: Environment,
) -> Result<ResolvedKey, KeyError> {
    let present = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    if let Some(secret) = present(explicit) {
        return Ok(ResolvedKey {
            secret,
            source: KeySource::Explicit,
        });
    }

    if let Some(secret) = present(platform) {
        return Ok(ResolvedKey {
            secret,
            source: KeySource::Platform,
        });
    }

    if environment.is_production() {
        return Err(KeyError::MissingInProduction("session signing key"));
    }

    warn!(
        environment = environment.as_str(),
        "No session signing key configured; using the built-in DEVELOPMENT key. \
         Sessions signed with it can be forged by anyone."
    );

    Ok(ResolvedKey {
        secret: DEVELOPMENT_SESSION_KEY.to_string(),
        source: KeySource::DevelopmentFallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_wins() {
        let key = resolve_session_key(Some("explicit"), Some("platform"), Environment::Production).unwrap();
        assert_eq!(key.secret(), "explicit");
        assert_eq!(key.source(), KeySource::Explicit);
    }

    #[test]
    fn test_platform_binding() {
        let key = resolve_session_key(None, Some("platform"), Environment::Production).unwrap();
        assert_eq!(key.secret(), "platform");
        assert_eq!(key.source(), KeySource::Platform);
    }

    #[test]
    fn test_empty_explicit_falls_through() {
        let key = resolve_session_key(Some("  "), Some("platform"), Environment::Development).unwrap();
        assert_eq!(key.source(), KeySource::Platform);
    }

    #[test]
    fn test_production_without_secret_fails() {
        let result = resolve_session_key(None, None, Environment::Production);
        assert!(matches!(result, Err(KeyError::MissingInProduction(_))));
    }

    #[test]
    fn test_development_fallback() {
        let key = resolve_session_key(None, Some(""), Environment::Development).unwrap();
        assert_eq!(key.secret(), DEVELOPMENT_SESSION_KEY);
        assert_eq!(key.source(), KeySource::DevelopmentFallback);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key = resolve_session_key(Some("hunter2"), None, Environment::Development).unwrap();
        assert!(!format!("{:?}", key).contains("hunter2"));
    }
}
