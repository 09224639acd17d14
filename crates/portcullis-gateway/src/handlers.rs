//! HTTP request handlers for the gateway.
//!
//! Browser-facing auth endpoints and the signed `/ai/*` proxy.

use crate::config::GatewayConfig;
use crate::cookies::{expired_session_cookie, read_cookie, session_cookie};
use crate::enrichment::enrich_body;
use crate::error::{ApiError, GatewayError};
use crate::mapping::EndpointMap;
use crate::proxy::{AiServiceClient, ForwardRequest, HEADER_REQUEST_ID};
use crate::signing::{RequestSigner, SigningContext, SigningError};
use crate::sso::{encode_state, is_safe_redirect, CallbackParams, SsoExchange};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{
        header::{ACCEPT, CONTENT_TYPE, LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, Method, StatusCode, Uri,
    },
    response::{IntoResponse, Json, Response},
    routing::{any, get, post},
    Router as AxumRouter,
};
use portcullis_auth::{extract_claims, HttpIdentityProvider, IdentityProvider, ResolvedKey, SessionCodec, SessionTokens};
use portcullis_domain::{Clock, OnboardingStatus, Session, SessionClaims};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration
    pub config: Arc<GatewayConfig>,
    /// Session cookie signer
    pub codec: Arc<SessionCodec>,
    /// Downstream token pairs, one coordinator per session
    pub tokens: SessionTokens,
    /// Identity provider client
    pub identity: Arc<HttpIdentityProvider>,
    /// Service-to-service signer
    pub signer: Arc<RequestSigner>,
    /// AI route table
    pub endpoints: Arc<EndpointMap>,
    /// AI service client
    pub ai_client: Arc<AiServiceClient>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Build state from configuration
    ///
    /// Does not validate; call [`GatewayConfig::validate`] first.
    pub fn from_config(config: GatewayConfig, clock: Arc<dyn Clock>) -> Result<Self, GatewayError> {
        let key = config.session_key().map_err(crate::config::ConfigError::from)?;
        Self::with_session_key(config, key, clock)
    }

    /// Build state around an already resolved session key
    pub fn with_session_key(
        config: GatewayConfig,
        key: ResolvedKey,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        let codec = Arc::new(SessionCodec::from_key(&key, clock.clone()));

        let identity = Arc::new(HttpIdentityProvider::new(config.identity.client_config())?);
        let tokens = SessionTokens::new(
            identity.clone(),
            clock.clone(),
            Duration::from_secs(config.refresh_buffer_secs),
        );

        let signer = Arc::new(RequestSigner::new(
            config.signing_secret(),
            config.signing.service_name.clone(),
            config.environment,
        ));

        let endpoints = Arc::new(if config.routes.is_empty() {
            EndpointMap::default()
        } else {
            EndpointMap::from_rules(&config.routes)
        });

        let ai_client = Arc::new(AiServiceClient::new(&config.ai_service)?);

        Ok(Self {
            config: Arc::new(config),
            codec,
            tokens,
            identity,
            signer,
            endpoints,
            ai_client,
            clock,
        })
    }

    fn secure_cookies(&self) -> bool {
        self.config.environment.is_production()
    }

    fn load_session(&self, headers: &HeaderMap) -> Result<Session, ApiError> {
        read_cookie(headers, &self.config.session.cookie_name)
            .and_then(|artifact| self.codec.decode(&artifact))
            .ok_or_else(ApiError::unauthenticated)
    }

    fn session_expires_at(&self) -> u64 {
        self.clock.now_secs() + self.config.session.ttl_secs
    }

    /// Token for downstream calls on behalf of this session
    ///
    /// Uses the session's own coordinator when one was seeded, else the
    /// access token carried in the session.
    async fn bearer_token(&self, session: &Session) -> Result<String, ApiError> {
        match self.tokens.coordinator(&session.claims) {
            None => Ok(session.claims.access_token.clone()),
            Some(coordinator) => coordinator
                .get_valid_access_token()
                .await
                .ok_or(ApiError::TokenRefresh),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Overall health status
    pub status: String,
    /// Deployment environment
    pub environment: String,
}

/// Public view of the current session
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// User identifier
    pub user_id: String,
    /// Email address
    pub email: String,
    /// Display name, falling back to email
    pub display_name: String,
    /// Active tenant
    pub tenant_id: Option<String>,
    /// Role within the tenant
    pub role: String,
    /// Granted permissions
    pub permissions: Vec<String>,
    /// Onboarding status
    pub onboarding_status: OnboardingStatus,
    /// Pending onboarding step
    pub onboarding_step: Option<String>,
    /// Whether onboarding must be completed first
    pub requires_onboarding: bool,
    /// Session expiry (Unix epoch seconds)
    pub expires_at: u64,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        let claims = &session.claims;
        Self {
            user_id: claims.user_id.clone(),
            email: claims.email.clone(),
            display_name: claims.display_name_or_email().to_string(),
            tenant_id: claims.tenant_id.clone(),
            role: claims.role.clone(),
            permissions: claims.permissions.clone(),
            onboarding_status: claims.onboarding_status,
            onboarding_step: claims.onboarding_step.clone(),
            requires_onboarding: claims.requires_onboarding,
            expires_at: session.expires_at,
        }
    }
}

/// Login redirect query
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    /// Post-login destination
    pub redirect: Option<String>,
}

/// Tenant switch request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchTenantRequest {
    /// Tenant to make active
    pub tenant_id: String,
}

/// Tenant switch response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchTenantResponse {
    /// Always true on success
    pub success: bool,
    /// Now-active tenant
    pub tenant_id: String,
}

/// Logout response
#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Always true
    pub success: bool,
}

fn redirect_response(location: &str, set_cookie: Option<&str>) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    let headers = response.headers_mut();
    match HeaderValue::from_str(location) {
        Ok(value) => {
            headers.insert(LOCATION, value);
        }
        Err(_) => {
            warn!("Refusing to redirect to an invalid location");
            headers.insert(LOCATION, HeaderValue::from_static("/"));
        }
    }
    if let Some(cookie) = set_cookie.and_then(|c| HeaderValue::from_str(c).ok()) {
        headers.insert(SET_COOKIE, cookie);
    }
    response
}

fn with_cookie(mut response: Response, cookie: &str) -> Result<Response, ApiError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|_| ApiError::BadRequest("Session could not be stored".to_string()))?;
    response.headers_mut().insert(SET_COOKIE, value);
    Ok(response)
}

/// GET /health - Liveness check
async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        environment: state.config.environment.as_str().to_string(),
    })
}

/// GET /auth/login/sso - Send the browser to the identity provider
async fn sso_login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, ApiError> {
    let login_state = query
        .redirect
        .as_deref()
        .filter(|r| is_safe_redirect(r))
        .and_then(encode_state);

    let url = state
        .identity
        .authorize_url(
            &state.config.identity.redirect_uri,
            &state.config.identity.scope,
            login_state.as_deref(),
        )
        .map_err(|e| ApiError::Configuration(e.to_string()))?;

    Ok(redirect_response(url.as_str(), None))
}

/// GET /auth/callback/sso - Complete the authorization-code exchange
async fn sso_callback(State(state): State<AppState>, Query(params): Query<CallbackParams>) -> Response {
    let exchange = SsoExchange {
        identity: state.identity.as_ref() as &dyn IdentityProvider,
        codec: &state.codec,
        redirect_uri: &state.config.identity.redirect_uri,
        redirects: &state.config.redirects,
        cookie_name: &state.config.session.cookie_name,
        ttl: state.config.session.ttl(),
        secure_cookie: state.secure_cookies(),
    };

    match exchange.run(params).await {
        Ok(success) => {
            let expires_at = state.session_expires_at();
            if !state.tokens.seed(&success.claims, &success.grant, expires_at) {
                debug!("Grant had no refresh token; token cache not seeded");
            }
            redirect_response(&success.location, Some(&success.set_cookie))
        }
        Err(failure) => {
            warn!(stage = ?failure.stage, code = %failure.code, "SSO login failed");
            redirect_response(&failure.login_redirect(&state.config.redirects.login_path), None)
        }
    }
}

/// POST /auth/logout - Drop the session and its cached tokens
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Ok(session) = state.load_session(&headers) {
        state.tokens.remove(&session.claims);
    }
    let cookie = expired_session_cookie(&state.config.session.cookie_name, state.secure_cookies());
    with_cookie(Json(LogoutResponse { success: true }).into_response(), &cookie)
}

/// GET /auth/session - Current session
async fn session_info(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<SessionView>, ApiError> {
    let session = state.load_session(&headers)?;
    Ok(Json(SessionView::from(&session)))
}

/// POST /auth/switch-tenant - Re-mint the session for another tenant
async fn switch_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SwitchTenantRequest>,
) -> Result<Response, ApiError> {
    let session = state.load_session(&headers)?;
    let tenant_id = request.tenant_id.trim().to_string();
    if tenant_id.is_empty() {
        return Err(ApiError::BadRequest("tenantId is required".to_string()));
    }

    let bearer = state.bearer_token(&session).await?;
    let grant = state.identity.switch_tenant(&bearer, &tenant_id).await?;

    let claims = match extract_claims(&grant.access_token) {
        Ok(identity) => identity.into_session_claims(&grant),
        Err(e) => {
            debug!(error = %e, "Tenant token has no readable claims; keeping session identity");
            SessionClaims {
                access_token: grant.access_token.clone(),
                refresh_token: grant
                    .refresh_token
                    .clone()
                    .or_else(|| session.claims.refresh_token.clone()),
                ..session.claims.clone()
            }
        }
    };
    let claims = if claims.tenant_id.is_none() {
        claims.with_tenant(Some(tenant_id.clone()))
    } else {
        claims
    };

    let artifact = state
        .codec
        .encode(&claims, state.config.session.ttl())
        .map_err(|e| ApiError::Configuration(e.to_string()))?;
    state.tokens.remove(&session.claims);
    state.tokens.seed(&claims, &grant, state.session_expires_at());

    info!(user_id = %claims.user_id, tenant_id = ?claims.tenant_id, "Switched tenant");

    let cookie = session_cookie(
        &state.config.session.cookie_name,
        &artifact,
        state.config.session.ttl_secs,
        state.secure_cookies(),
    );
    let body = Json(SwitchTenantResponse {
        success: true,
        tenant_id: claims.tenant_id.unwrap_or(tenant_id),
    });
    with_cookie(body.into_response(), &cookie)
}

/// ANY /ai/* - Sign and forward to the AI service
async fn proxy_ai(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let public_path = uri.path().strip_prefix("/ai/").unwrap_or_default();
    let route = state
        .endpoints
        .resolve(public_path)
        .ok_or_else(|| ApiError::Mapping(public_path.to_string()))?;

    let session = state.load_session(&headers)?;
    state.signer.ensure_ready().map_err(signing_error)?;
    let tenant_id = session
        .claims
        .tenant_id
        .clone()
        .ok_or(ApiError::TenantRequired)?;

    let body = if route.enrich {
        let token = state.bearer_token(&session).await?;
        enrich_body(&body, &session.claims, &token).map_err(|e| ApiError::BadRequest(e.to_string()))?
    } else {
        body.to_vec()
    };

    let request_id = Uuid::now_v7().to_string();
    let ctx = SigningContext {
        tenant_id: &tenant_id,
        user_id: &session.claims.user_id,
        timestamp: state.clock.now_millis().to_string(),
        body: &body,
    };
    let mut forward_headers = state.signer.sign_headers(&ctx).map_err(signing_error)?;
    forward_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        forward_headers.insert(HEADER_REQUEST_ID, value);
    }
    if let Some(accept) = headers.get(ACCEPT) {
        forward_headers.insert(ACCEPT, accept.clone());
    }

    let span = info_span!("ai_proxy", request_id = %request_id, path = %public_path);
    debug!(
        parent: &span,
        internal = %route.internal_path,
        enriched = route.enrich,
        "Proxying AI request"
    );

    state
        .ai_client
        .forward(ForwardRequest {
            method,
            internal_path: route.internal_path,
            query: uri.query().map(str::to_string),
            body,
            headers: forward_headers,
        })
        .instrument(span)
        .await
}

fn signing_error(e: SigningError) -> ApiError {
    match e {
        SigningError::MissingSecret | SigningError::InvalidKey => {
            warn!(error = %e, "Refusing to forward unsigned request");
            ApiError::Configuration(e.to_string())
        }
        SigningError::InvalidHeader(_) => ApiError::BadRequest(e.to_string()),
    }
}

/// Create the axum router with all routes
pub fn create_router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health_check))
        .route("/auth/login/sso", get(sso_login))
        .route("/auth/callback/sso", get(sso_callback))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(session_info))
        .route("/auth/switch-tenant", post(switch_tenant))
        .route("/ai/*path", any(proxy_ai))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use portcullis_domain::ManualClock;
    use tower::ServiceExt;

    const NOW: u64 = 1_700_000_000;

    fn test_state() -> AppState {
        AppState::from_config(
            GatewayConfig::default_test_config(),
            Arc::new(ManualClock::at_secs(NOW)),
        )
        .unwrap()
    }

    fn session_cookie_for(state: &AppState, claims: &SessionClaims) -> String {
        let artifact = state.codec.encode(claims, state.config.session.ttl()).unwrap();
        format!("session={}", artifact)
    }

    #[test]
    fn test_state_uses_validated_session_key() {
        let mut config = GatewayConfig::default_test_config();
        config.session.secret = None;
        let key = config.validate().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_secs(NOW));

        let state = AppState::with_session_key(config, key.clone(), clock.clone()).unwrap();
        let claims = SessionClaims::new("u1", "ada@example.com", "admin", "access");
        let artifact = state.codec.encode(&claims, state.config.session.ttl()).unwrap();

        let independent = SessionCodec::from_key(&key, clock);
        assert_eq!(independent.decode(&artifact).unwrap().claims, claims);
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthCheckResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.environment, "development");
    }

    #[tokio::test]
    async fn test_session_requires_cookie() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/auth/session").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_view() {
        let state = test_state();
        let claims = SessionClaims::new("u1", "ada@example.com", "admin", "access")
            .with_tenant(Some("t1".to_string()));
        let cookie = session_cookie_for(&state, &claims);
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/session")
                    .header("cookie", cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["tenantId"], "t1");
        assert_eq!(value["displayName"], "ada@example.com");
        assert_eq!(value["onboardingStatus"], "completed");
        assert_eq!(value["expiresAt"], NOW + 604_800);
        assert!(value.get("accessToken").is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_login_redirects_to_provider() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/login/sso?redirect=%2Fleads%2F7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[LOCATION].to_str().unwrap();
        assert!(location.starts_with("http://127.0.0.1:8081/oauth2/authorize?"));
        assert!(location.contains("response_type=code"));
        assert!(location.contains("client_id=crm-web"));
        assert!(location.contains("state="));
    }

    #[tokio::test]
    async fn test_login_drops_offsite_redirect() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/login/sso?redirect=%2F%2Fevil.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let location = response.headers()[LOCATION].to_str().unwrap();
        assert!(!location.contains("state="));
    }

    #[tokio::test]
    async fn test_unmapped_ai_path_is_not_found() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ai/admin/users")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ai_requires_tenant() {
        let state = test_state();
        let claims = SessionClaims::new("u1", "ada@example.com", "admin", "access");
        let cookie = session_cookie_for(&state, &claims);
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ai/chat")
                    .header("cookie", cookie)
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_switch_tenant_requires_tenant_id() {
        let state = test_state();
        let claims = SessionClaims::new("u1", "ada@example.com", "admin", "access");
        let cookie = session_cookie_for(&state, &claims);
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/switch-tenant")
                    .header("cookie", cookie)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"tenantId":"  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
