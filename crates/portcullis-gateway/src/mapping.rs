//! Public-to-internal AI endpoint mapping.
//!
//! Browsers call `/ai/{public}`; the gateway forwards to
//! `/internal/ai/{internal}`. Exact entries are checked first, then prefix
//! rules in declaration order. Anything unmapped is a 404 and never reaches
//! the AI service.

use serde::Deserialize;
use std::collections::HashMap;

/// How a rule matches the public path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Whole path must match
    #[default]
    Exact,
    /// Path must start with the rule's segments; the rest is carried over
    Prefix,
}

/// One mapping rule, as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteRule {
    /// Public path under `/ai/`
    pub public: String,

    /// Internal path under `/internal/ai/`
    pub internal: String,

    /// Match mode
    #[serde(default)]
    pub kind: MatchKind,

    /// Whether the request body gets tenant and user context
    #[serde(default)]
    pub enrich: bool,
}

impl RouteRule {
    /// Exact-match rule
    pub fn exact(public: &str, internal: &str, enrich: bool) -> Self {
        Self {
            public: public.to_string(),
            internal: internal.to_string(),
            kind: MatchKind::Exact,
            enrich,
        }
    }

    /// Prefix rule
    pub fn prefix(public: &str, internal: &str, enrich: bool) -> Self {
        Self {
            public: public.to_string(),
            internal: internal.to_string(),
            kind: MatchKind::Prefix,
            enrich,
        }
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// Path under `/internal/ai/`, without leading slash
    pub internal_path: String,

    /// Whether to enrich the body
    pub enrich: bool,
}

#[derive(Debug, Clone)]
struct Target {
    internal: String,
    enrich: bool,
}

/// Lookup table for AI routes
#[derive(Debug, Clone)]
pub struct EndpointMap {
    exact: HashMap<String, Target>,
    prefixes: Vec<(String, Target)>,
}

/// Built-in AI route table
pub fn default_ai_routes() -> Vec<RouteRule> {
    vec![
        RouteRule::exact("chat", "chat", true),
        RouteRule::exact("chat/stream", "chat/stream", true),
        RouteRule::exact("agent/run", "agents/execute", true),
        RouteRule::exact("insights/leads", "insights/lead-scoring", false),
        RouteRule::exact("summaries", "summaries/generate", false),
        RouteRule::exact("email/draft", "email/draft", true),
        RouteRule::exact("conversations", "conversations", false),
        RouteRule::prefix("conversations", "conversations", false),
        RouteRule::prefix("agents", "agents", true),
        RouteRule::prefix("insights", "insights", false),
    ]
}

impl Default for EndpointMap {
    fn default() -> Self {
        Self::from_rules(&default_ai_routes())
    }
}

impl EndpointMap {
    /// Build a map from rules; later exact duplicates replace earlier ones
    pub fn from_rules(rules: &[RouteRule]) -> Self {
        let mut exact = HashMap::new();
        let mut prefixes = Vec::new();

        for rule in rules {
            let public = rule.public.trim_matches('/').to_string();
            let target = Target {
                internal: rule.internal.trim_matches('/').to_string(),
                enrich: rule.enrich,
            };
            match rule.kind {
                MatchKind::Exact => {
                    exact.insert(public, target);
                }
                MatchKind::Prefix => prefixes.push((public, target)),
            }
        }

        Self { exact, prefixes }
    }

    /// Resolve a public path (the part after `/ai/`)
    pub fn resolve(&self, public_path: &str) -> Option<ResolvedRoute> {
        let path = normalize(public_path)?;

        if let Some(target) = self.exact.get(path) {
            return Some(ResolvedRoute {
                internal_path: target.internal.clone(),
                enrich: target.enrich,
            });
        }

        self.prefixes.iter().find_map(|(prefix, target)| {
            let rest = path.strip_prefix(prefix.as_str())?.strip_prefix('/')?;
            if rest.is_empty() {
                return None;
            }
            Some(ResolvedRoute {
                internal_path: format!("{}/{}", target.internal, rest),
                enrich: target.enrich,
            })
        })
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    /// Whether the map has no rules
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trim slashes and reject paths that could escape the internal namespace
fn normalize(path: &str) -> Option<&str> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return None;
    }
    let safe = path.split('/').all(|segment| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment.chars().all(is_segment_char)
    });
    safe.then_some(path)
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | ':' | '@')
}
