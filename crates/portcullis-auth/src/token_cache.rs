//! Token cache with single-flight refresh.
//!
//! A coordinator owns the only live [`TokenPair`] for one session. When a reader finds the
//! access token inside the refresh buffer it joins the refresh already in
//! flight for that token generation, or starts one. All joined readers await
//! the same shared future, so the identity provider sees at most one refresh
//! call per generation.
//!
//! Every `set_tokens`/`clear_tokens` and every completed refresh starts a new
//! generation. A refresh that completes after its generation was superseded
//! is discarded instead of overwriting the newer pair.

use crate::error::IdentityError;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use portcullis_domain::{Clock, TokenGrant, TokenPair};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default window before expiry in which a token is refreshed: 5 minutes
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Performs the `grant_type=refresh_token` call
///
/// Implemented by the identity provider client.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange a refresh token for a new grant
    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenGrant, IdentityError>;
}

type SharedRefresh = Shared<BoxFuture<'static, Option<TokenPair>>>;

struct CacheState {
    tokens: Option<TokenPair>,
    generation: u64,
    in_flight: Option<SharedRefresh>,
}

struct Inner {
    state: Mutex<CacheState>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    refresh_buffer_secs: u64,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        // The guarded state is replaced wholesale, so a poisoned value is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run_refresh(self: Arc<Self>, refresh_token: String, generation: u64) -> Option<TokenPair> {
        debug!(generation, "Refreshing downstream access token");
        let result = self.refresher.refresh_tokens(&refresh_token).await;
        let now = self.clock.now_secs();

        let mut state = self.lock_state();
        if state.generation != generation {
            debug!(generation, "Discarding refresh result for superseded token generation");
            return state.tokens.clone();
        }

        state.in_flight = None;
        state.generation += 1;

        let refreshed = match result {
            Ok(grant) => TokenPair::from_grant(grant, now, Some(&refresh_token)),
            Err(e) => {
                warn!(error = %e, "Token refresh failed; clearing cached tokens");
                None
            }
        };

        match &refreshed {
            Some(pair) => info!(expires_at = pair.expires_at, "Downstream access token refreshed"),
            None => debug!("Token cache cleared after failed refresh"),
        }

        state.tokens = refreshed.clone();
        refreshed
    }
}

/// Coordinator for one session's token pair
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct TokenCoordinator {
    inner: Arc<Inner>,
}

impl TokenCoordinator {
    /// Create an empty coordinator with the default refresh buffer
    pub fn new(refresher: Arc<dyn TokenRefresher>, clock: Arc<dyn Clock>) -> Self {
        Self::with_refresh_buffer(refresher, clock, DEFAULT_REFRESH_BUFFER)
    }

    /// Create an empty coordinator with a custom refresh buffer
    pub fn with_refresh_buffer(
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
        refresh_buffer: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState {
                    tokens: None,
                    generation: 0,
                    in_flight: None,
                }),
                refresher,
                clock,
                refresh_buffer_secs: refresh_buffer.as_secs(),
            }),
        }
    }

    /// Get a valid access token, refreshing if it is inside the buffer window
    ///
    /// Returns `None` when nothing is cached or the refresh failed.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        self.get_valid_tokens().await.map(|pair| pair.access_token)
    }

    /// Get the valid token pair, refreshing if needed
    pub async fn get_valid_tokens(&self) -> Option<TokenPair> {
        let now = self.inner.clock.now_secs();
        let (cached, generation) = {
            let state = self.inner.lock_state();
            (state.tokens.clone()?, state.generation)
        };

        if !cached.expires_within(now, self.inner.refresh_buffer_secs) {
            return Some(cached);
        }

        self.refresh_generation(Some(generation)).await
    }

    /// Refresh the cached pair
    ///
    /// Joins a refresh already in flight. On failure the cache is cleared and
    /// `None` is returned; this never errors.
    pub async fn refresh(&self) -> Option<TokenPair> {
        self.refresh_generation(None).await
    }

    async fn refresh_generation(&self, observed: Option<u64>) -> Option<TokenPair> {
        let pending = {
            let mut state = self.inner.lock_state();
            if let Some(pending) = state.in_flight.clone() {
                pending
            } else {
                if observed.is_some_and(|generation| generation != state.generation) {
                    // Replaced while we were looking; use the newer pair
                    return state.tokens.clone();
                }

                let refresh_token = state.tokens.as_ref()?.refresh_token.clone();
                let generation = state.generation;
                let inner = Arc::clone(&self.inner);
                let pending = inner.run_refresh(refresh_token, generation).boxed().shared();
                state.in_flight = Some(pending.clone());
                pending
            }
        };

        pending.await
    }

    /// Replace the cached pair (login) or clear it (`None`)
    pub fn set_tokens(&self, tokens: Option<TokenPair>) {
        let mut state = self.inner.lock_state();
        state.tokens = tokens;
        state.generation += 1;
        state.in_flight = None;
    }

    /// Drop the cached pair (logout)
    pub fn clear_tokens(&self) {
        self.set_tokens(None);
    }

    /// Whether a pair is currently cached
    pub fn has_tokens(&self) -> bool {
        self.inner.lock_state().tokens.is_some()
    }

    /// Seed the cache from a token endpoint response
    ///
    /// Returns `false` (and leaves the cache untouched) when the grant has no
    /// refresh token, since such a pair could never be refreshed.
    pub fn set_from_grant(&self, grant: &TokenGrant) -> bool {
        let now = self.inner.clock.now_secs();
        match TokenPair::from_grant(grant.clone(), now, None) {
            Some(pair) => {
                self.set_tokens(Some(pair));
                true
            }
            None => false,
        }
    }
}
