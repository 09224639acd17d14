//! Gateway configuration.
//!
//! Loaded from a TOML file, then overlaid with environment variables. Secrets
//! normally arrive through the environment so the file can be committed.

use crate::mapping::RouteRule;
use portcullis_auth::{resolve_session_key, IdentityClientConfig, KeyError, ResolvedKey};
use portcullis_domain::Environment;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable names read by [`GatewayConfig::apply_env`]
pub mod env_vars {
    /// Deployment environment (`production` or `development`)
    pub const ENVIRONMENT: &str = "PORTCULLIS_ENV";
    /// Explicit session signing secret
    pub const SESSION_SECRET: &str = "PORTCULLIS_SESSION_SECRET";
    /// Session secret bound by the hosting platform
    pub const PLATFORM_SESSION_SECRET: &str = "SESSION_SECRET";
    /// Service-to-service signing secret
    pub const SERVICE_SECRET: &str = "PORTCULLIS_SERVICE_SECRET";
    /// AI service base URL
    pub const AI_SERVICE_URL: &str = "PORTCULLIS_AI_SERVICE_URL";
    /// Identity provider base URL
    pub const IDENTITY_URL: &str = "PORTCULLIS_IDENTITY_URL";
    /// OAuth client secret
    pub const CLIENT_SECRET: &str = "PORTCULLIS_CLIENT_SECRET";
    /// Listen address
    pub const BIND_ADDRESS: &str = "PORTCULLIS_BIND_ADDRESS";
    /// Listen port
    pub const BIND_PORT: &str = "PORTCULLIS_BIND_PORT";
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Required value absent
    #[error("Missing required setting: {0}")]
    MissingField(&'static str),

    /// Value present but unusable
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Setting name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Session key could not be resolved
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// A secret string that never appears in debug output
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The secret value
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Bind port
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Seconds before expiry at which cached tokens are refreshed
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: u64,

    /// Session cookie settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Service-to-service signing settings
    #[serde(default)]
    pub signing: SigningConfig,

    /// Identity provider settings
    pub identity: IdentityConfig,

    /// AI service settings
    pub ai_service: AiServiceConfig,

    /// Browser redirect targets
    #[serde(default)]
    pub redirects: RedirectConfig,

    /// AI route overrides; empty means the built-in table
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// Session cookie settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Explicit signing secret
    #[serde(default)]
    pub secret: Option<Secret>,

    /// Platform-provided signing secret
    #[serde(default)]
    pub platform_secret: Option<Secret>,

    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    /// Cookie name
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            platform_secret: None,
            ttl_secs: default_session_ttl_secs(),
            cookie_name: default_cookie_name(),
        }
    }
}

impl SessionConfig {
    /// Session lifetime
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Service-to-service signing settings
#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// Shared HMAC secret
    #[serde(default)]
    pub secret: Option<Secret>,

    /// Name sent as the calling service
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret: None,
            service_name: default_service_name(),
        }
    }
}

/// Identity provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Provider base URL
    pub base_url: String,

    /// OAuth client identifier
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: Option<Secret>,

    /// Callback URL registered with the provider
    pub redirect_uri: String,

    /// Requested scopes
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Request timeout in seconds
    #[serde(default = "default_identity_timeout_secs")]
    pub timeout_secs: u64,
}

impl IdentityConfig {
    /// Client settings for the identity provider
    pub fn client_config(&self) -> IdentityClientConfig {
        IdentityClientConfig::new(self.base_url.clone(), self.client_id.clone())
            .with_client_secret(self.client_secret.as_ref().map(|s| s.expose().to_string()))
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// AI service settings
#[derive(Debug, Clone, Deserialize)]
pub struct AiServiceConfig {
    /// Base URL of the internal AI service
    pub base_url: String,

    /// Time allowed for a response to start, in seconds
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Browser redirect targets after login
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectConfig {
    /// Login page, receives `?error=` on failure
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Where users without a tenant go
    #[serde(default = "default_onboarding_path")]
    pub onboarding_path: String,

    /// Default landing page
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            onboarding_path: default_onboarding_path(),
            landing_path: default_landing_path(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_bind_port() -> u16 {
    8080
}

fn default_refresh_buffer_secs() -> u64 {
    300
}

fn default_session_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_cookie_name() -> String {
    "session".to_string()
}

fn default_service_name() -> String {
    "crm-gateway".to_string()
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_identity_timeout_secs() -> u64 {
    10
}

fn default_ai_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_onboarding_path() -> String {
    "/onboarding/create-business".to_string()
}

fn default_landing_path() -> String {
    "/dashboard".to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay values from the environment
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`; blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        if let Some(name) = get(env_vars::ENVIRONMENT) {
            self.environment = Environment::parse(&name).ok_or_else(|| ConfigError::InvalidValue {
                field: "environment",
                reason: format!("'{}' is not one of production, prod, development, dev", name),
            })?;
        }
        if let Some(secret) = get(env_vars::SESSION_SECRET) {
            self.session.secret = Some(Secret::new(secret));
        }
        if let Some(secret) = get(env_vars::PLATFORM_SESSION_SECRET) {
            self.session.platform_secret = Some(Secret::new(secret));
        }
        if let Some(secret) = get(env_vars::SERVICE_SECRET) {
            self.signing.secret = Some(Secret::new(secret));
        }
        if let Some(url) = get(env_vars::AI_SERVICE_URL) {
            self.ai_service.base_url = url;
        }
        if let Some(url) = get(env_vars::IDENTITY_URL) {
            self.identity.base_url = url;
        }
        if let Some(secret) = get(env_vars::CLIENT_SECRET) {
            self.identity.client_secret = Some(Secret::new(secret));
        }
        if let Some(address) = get(env_vars::BIND_ADDRESS) {
            self.bind_address = address;
        }
        if let Some(port) = get(env_vars::BIND_PORT) {
            self.bind_port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "bind_port",
                reason: format!("'{}' is not a port number", port),
            })?;
        }
        Ok(())
    }

    /// Check the configuration is usable in its environment
    ///
    /// Production refuses to start without both signing secrets. Returns the
    /// session key so startup resolves it exactly once.
    pub fn validate(&self) -> Result<ResolvedKey, ConfigError> {
        if self.environment.is_production() && self.signing_secret().is_none() {
            return Err(ConfigError::MissingField("signing.secret"));
        }
        let key = self.session_key()?;

        if self.session.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.ttl_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(ConfigError::MissingField("session.cookie_name"));
        }

        check_url("identity.base_url", &self.identity.base_url)?;
        check_url("identity.redirect_uri", &self.identity.redirect_uri)?;
        check_url("ai_service.base_url", &self.ai_service.base_url)?;

        if self.identity.client_id.trim().is_empty() {
            return Err(ConfigError::MissingField("identity.client_id"));
        }

        check_path("redirects.login_path", &self.redirects.login_path)?;
        check_path("redirects.onboarding_path", &self.redirects.onboarding_path)?;
        check_path("redirects.landing_path", &self.redirects.landing_path)?;

        for rule in &self.routes {
            if rule.public.trim_matches('/').is_empty() || rule.internal.trim_matches('/').is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "routes",
                    reason: "public and internal paths must be non-empty".to_string(),
                });
            }
        }

        Ok(key)
    }

    /// Resolve the session signing key for this environment
    pub fn session_key(&self) -> Result<ResolvedKey, KeyError> {
        resolve_session_key(
            self.session.secret.as_ref().map(Secret::expose),
            self.session.platform_secret.as_ref().map(Secret::expose),
            self.environment,
        )
    }

    /// Service signing secret, if one is set
    pub fn signing_secret(&self) -> Option<&str> {
        self.signing
            .secret
            .as_ref()
            .map(Secret::expose)
            .filter(|s| !s.trim().is_empty())
    }

    /// Get the bind address as a string
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.bind_port)
    }

    /// Create a default configuration for local testing
    pub fn default_test_config() -> Self {
        Self {
            environment: Environment::Development,
            bind_address: "127.0.0.1".to_string(),
            bind_port: 8080,
            refresh_buffer_secs: default_refresh_buffer_secs(),
            session: SessionConfig {
                secret: Some(Secret::new("test-session-secret")),
                ..SessionConfig::default()
            },
            signing: SigningConfig {
                secret: Some(Secret::new("test-service-secret")),
                ..SigningConfig::default()
            },
            identity: IdentityConfig {
                base_url: "http://127.0.0.1:8081".to_string(),
                client_id: "crm-web".to_string(),
                client_secret: None,
                redirect_uri: "http://127.0.0.1:8080/auth/callback/sso".to_string(),
                scope: default_scope(),
                timeout_secs: default_identity_timeout_secs(),
            },
            ai_service: AiServiceConfig {
                base_url: "http://127.0.0.1:8000".to_string(),
                timeout_secs: default_ai_timeout_secs(),
                connect_timeout_secs: default_connect_timeout_secs(),
            },
            redirects: RedirectConfig::default(),
            routes: Vec::new(),
        }
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        Ok(url) => Err(ConfigError::InvalidValue {
            field,
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => Err(ConfigError::InvalidValue {
            field,
            reason: e.to_string(),
        }),
    }
}

fn check_path(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with('/') && !value.starts_with("//") {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: "must be an absolute path on this site".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portcullis_auth::KeySource;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
        [identity]
        base_url = "https://id.example.com"
        client_id = "crm-web"
        redirect_uri = "https://crm.example.com/auth/callback/sso"

        [ai_service]
        base_url = "http://ai.internal:8000"
    "#;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = GatewayConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.refresh_buffer_secs, 300);
        assert_eq!(config.session.ttl_secs, 604_800);
        assert_eq!(config.session.cookie_name, "session");
        assert_eq!(config.signing.service_name, "crm-gateway");
        assert_eq!(config.ai_service.timeout_secs, 30);
        assert_eq!(config.redirects.onboarding_path, "/onboarding/create-business");
        assert!(config.routes.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let mut config = GatewayConfig::from_toml(MINIMAL).unwrap();
        config
            .apply_env(lookup(&[
                (env_vars::ENVIRONMENT, "production"),
                (env_vars::SESSION_SECRET, "s3ssion"),
                (env_vars::SERVICE_SECRET, "s3rvice"),
                (env_vars::AI_SERVICE_URL, "http://ai.override:9000"),
                (env_vars::BIND_PORT, "9090"),
                (env_vars::CLIENT_SECRET, ""),
            ]))
            .unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.signing_secret(), Some("s3rvice"));
        assert_eq!(config.ai_service.base_url, "http://ai.override:9000");
        assert_eq!(config.bind_port, 9090);
        assert!(config.identity.client_secret.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_env() {
        let mut config = GatewayConfig::from_toml(MINIMAL).unwrap();
        let err = config
            .apply_env(lookup(&[(env_vars::BIND_PORT, "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "bind_port", .. }));
    }

    #[test]
    fn test_unknown_environment_name_rejected() {
        let mut config = GatewayConfig::from_toml(MINIMAL).unwrap();
        let err = config
            .apply_env(lookup(&[(env_vars::ENVIRONMENT, "prd")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "environment", .. }));
        assert_eq!(config.environment, Environment::Development);

        let mut config = GatewayConfig::from_toml(MINIMAL).unwrap();
        assert!(config
            .apply_env(lookup(&[(env_vars::ENVIRONMENT, "Production-EU")]))
            .is_err());

        let mut config = GatewayConfig::from_toml(MINIMAL).unwrap();
        config
            .apply_env(lookup(&[(env_vars::ENVIRONMENT, "dev")]))
            .unwrap();
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_validate_returns_session_key() {
        let config = GatewayConfig::default_test_config();
        let key = config.validate().unwrap();
        assert_eq!(key.source(), KeySource::Explicit);
        assert_eq!(key.secret(), "test-session-secret");

        let mut config = GatewayConfig::default_test_config();
        config.session.secret = None;
        let key = config.validate().unwrap();
        assert_eq!(key.source(), KeySource::DevelopmentFallback);
    }

    #[test]
    fn test_production_requires_signing_secret() {
        let mut config = GatewayConfig::from_toml(MINIMAL).unwrap();
        config
            .apply_env(lookup(&[
                (env_vars::ENVIRONMENT, "production"),
                (env_vars::SESSION_SECRET, "s3ssion"),
            ]))
            .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField("signing.secret"))
        ));
    }

    #[test]
    fn test_production_requires_session_secret() {
        let mut config = GatewayConfig::from_toml(MINIMAL).unwrap();
        config
            .apply_env(lookup(&[
                (env_vars::ENVIRONMENT, "production"),
                (env_vars::SERVICE_SECRET, "s3rvice"),
            ]))
            .unwrap();

        assert!(matches!(config.validate(), Err(ConfigError::Key(_))));
    }

    #[test]
    fn test_platform_secret_satisfies_production() {
        let mut config = GatewayConfig::from_toml(MINIMAL).unwrap();
        config
            .apply_env(lookup(&[
                (env_vars::ENVIRONMENT, "production"),
                (env_vars::PLATFORM_SESSION_SECRET, "platform"),
                (env_vars::SERVICE_SECRET, "s3rvice"),
            ]))
            .unwrap();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = GatewayConfig::default_test_config();
        config.session.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default_test_config();
        config.ai_service.base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "ai_service.base_url", .. })
        ));

        let mut config = GatewayConfig::default_test_config();
        config.redirects.landing_path = "https://evil.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_debug_redacted() {
        let config = GatewayConfig::default_test_config();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("test-session-secret"));
        assert!(!debug.contains("test-service-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_route_overrides() {
        let toml = format!(
            "{}\n{}",
            MINIMAL,
            r#"
            [[routes]]
            public = "forecast"
            internal = "insights/forecast"
            enrich = true
            "#
        );
        let config = GatewayConfig::from_toml(&toml).unwrap();
        assert_eq!(config.routes.len(), 1);
        assert!(config.routes[0].enrich);
    }
}
