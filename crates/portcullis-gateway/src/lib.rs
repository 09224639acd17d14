//! Portcullis Gateway
//!
//! The CRM's trust boundary: SSO login and session cookies for the browser,
//! and a signed proxy from `/ai/*` to the internal AI service.

#![warn(missing_docs)]

pub mod config;
pub mod cookies;
pub mod enrichment;
pub mod error;
pub mod handlers;
pub mod mapping;
pub mod proxy;
pub mod signing;
pub mod sso;

pub use config::GatewayConfig;
pub use error::{ApiError, GatewayError};
pub use handlers::{create_router, AppState};

use portcullis_domain::SystemClock;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Start the gateway HTTP server
///
/// Validates the configuration, builds shared state and serves until the
/// process is stopped.
pub async fn start_server(config: GatewayConfig) -> Result<(), GatewayError> {
    let session_key = match config.validate() {
        Ok(key) => key,
        Err(e) => {
            if config.environment.is_production() {
                error!(error = %e, "Refusing to start with invalid production configuration");
            }
            return Err(e.into());
        }
    };

    let bind_addr = config.bind_addr();
    info!("Starting Portcullis gateway");
    info!("Environment: {}", config.environment.as_str());
    info!("Identity provider: {}", config.identity.base_url);
    info!("AI service: {}", config.ai_service.base_url);

    let state = AppState::with_session_key(config, session_key, Arc::new(SystemClock))?;
    info!("AI routes: {}", state.endpoints.len());
    if !state.signer.is_configured() {
        info!("No service signing secret; AI requests will be marked unsigned");
    }

    let app = create_router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| GatewayError::Server(e.to_string()))?;

    Ok(())
}
