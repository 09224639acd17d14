//! Per-session registry of token coordinators.
//!
//! Each session minted by the gateway (SSO login or tenant switch) gets its own
//! [`TokenCoordinator`], keyed by the subject and the access token the session
//! was minted with. Requests carrying that session share its coordinator, so
//! refreshes stay single-flight per session and a pair never leaks to another
//! user's requests.

use crate::token_cache::{TokenCoordinator, TokenRefresher};
use portcullis_domain::{Clock, SessionClaims, TokenGrant, TokenPair};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    user_id: String,
    minted_with: String,
}

impl SessionKey {
    fn for_claims(claims: &SessionClaims) -> Self {
        Self {
            user_id: claims.user_id.clone(),
            minted_with: claims.access_token.clone(),
        }
    }
}

struct Entry {
    coordinator: TokenCoordinator,
    session_expires_at: u64,
}

struct Inner {
    sessions: Mutex<HashMap<SessionKey, Entry>>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    refresh_buffer: Duration,
}

impl Inner {
    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, Entry>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Token coordinators for live sessions
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct SessionTokens {
    inner: Arc<Inner>,
}

impl SessionTokens {
    /// Create an empty registry
    pub fn new(refresher: Arc<dyn TokenRefresher>, clock: Arc<dyn Clock>, refresh_buffer: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                refresher,
                clock,
                refresh_buffer,
            }),
        }
    }

    /// Seed the coordinator for a freshly minted session from its grant
    ///
    /// Returns `false` when the grant has no refresh token; nothing is cached
    /// and the session's own access token stays authoritative.
    pub fn seed(&self, claims: &SessionClaims, grant: &TokenGrant, session_expires_at: u64) -> bool {
        let coordinator = self.new_coordinator();
        if !coordinator.set_from_grant(grant) {
            return false;
        }
        self.insert(claims, coordinator, session_expires_at);
        true
    }

    /// Seed the coordinator for a session with an existing pair
    pub fn seed_pair(&self, claims: &SessionClaims, pair: TokenPair, session_expires_at: u64) {
        let coordinator = self.new_coordinator();
        coordinator.set_tokens(Some(pair));
        self.insert(claims, coordinator, session_expires_at);
    }

    /// Coordinator for the session these claims belong to, if one was seeded
    pub fn coordinator(&self, claims: &SessionClaims) -> Option<TokenCoordinator> {
        let now = self.inner.clock.now_secs();
        let key = SessionKey::for_claims(claims);
        let mut sessions = self.inner.lock_sessions();
        let found = sessions
            .get(&key)
            .map(|entry| (entry.session_expires_at >= now, entry.coordinator.clone()));
        match found {
            Some((true, coordinator)) => Some(coordinator),
            Some((false, _)) => {
                sessions.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Whether the session's coordinator currently holds a pair
    pub fn has_tokens(&self, claims: &SessionClaims) -> bool {
        self.coordinator(claims).is_some_and(|c| c.has_tokens())
    }

    /// Drop the session's coordinator (logout)
    pub fn remove(&self, claims: &SessionClaims) -> bool {
        let key = SessionKey::for_claims(claims);
        match self.inner.lock_sessions().remove(&key) {
            Some(entry) => {
                entry.coordinator.clear_tokens();
                true
            }
            None => false,
        }
    }

    /// Number of sessions with a coordinator
    pub fn len(&self) -> usize {
        self.inner.lock_sessions().len()
    }

    /// Whether no session has a coordinator
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn new_coordinator(&self) -> TokenCoordinator {
        TokenCoordinator::with_refresh_buffer(
            Arc::clone(&self.inner.refresher),
            Arc::clone(&self.inner.clock),
            self.inner.refresh_buffer,
        )
    }

    fn insert(&self, claims: &SessionClaims, coordinator: TokenCoordinator, session_expires_at: u64) {
        let now = self.inner.clock.now_secs();
        let mut sessions = self.inner.lock_sessions();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.session_expires_at >= now);
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!(pruned, "Dropped token coordinators for expired sessions");
        }
        sessions.insert(
            SessionKey::for_claims(claims),
            Entry {
                coordinator,
                session_expires_at,
            },
        );
    }
}
