//! Deployment environment flag

use serde::{Deserialize, Serialize};

/// Deployment environment
///
/// Only `Production` changes behavior: secret fallbacks are refused and
/// cookies are marked `Secure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local or shared non-production deployment
    #[default]
    Development,

    /// Production deployment; fail closed on missing secrets
    Production,
}

impl Environment {
    /// Whether this is a production deployment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// Parse an environment name
    ///
    /// Accepts `production`/`prod` and `development`/`dev`, case-insensitively.
    /// Anything else is `None`; callers must reject it rather than guess.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Some(Environment::Production),
            "development" | "dev" => Some(Environment::Development),
            _ => None,
        }
    }
}
