//! Portcullis Authentication Layer
//!
//! The trust primitives behind the CRM edge:
//!
//! - [`token_cache::TokenCoordinator`]: one token pair with single-flight refresh
//! - [`session_tokens::SessionTokens`]: a coordinator per live session
//! - [`session::SessionCodec`]: signs and verifies the session cookie artifact
//! - [`keys::resolve_session_key`]: session key resolution that fails closed in production
//! - [`identity::HttpIdentityProvider`]: OAuth2 token endpoint client
//! - [`claims::extract_claims`]: reads identity claims from provider tokens
//!
//! # Examples
//!
//! ```
//! use portcullis_auth::session::{SessionCodec, DEFAULT_SESSION_TTL};
//! use portcullis_domain::{SessionClaims, SystemClock};
//! use std::sync::Arc;
//!
//! let codec = SessionCodec::new("secret", Arc::new(SystemClock));
//! let claims = SessionClaims::new("user-1", "ada@example.com", "admin", "access");
//! let artifact = codec.encode(&claims, DEFAULT_SESSION_TTL).unwrap();
//! assert_eq!(codec.decode(&artifact).unwrap().claims, claims);
//! ```

#![warn(missing_docs)]

pub mod claims;
pub mod error;
pub mod identity;
pub mod keys;
pub mod session;
pub mod session_tokens;
pub mod token_cache;

pub use claims::{extract_claims, IdentityClaims};
pub use error::{ClaimsError, IdentityError, KeyError, SessionError};
pub use identity::{HttpIdentityProvider, IdentityClientConfig, IdentityProvider};
pub use keys::{resolve_session_key, KeySource, ResolvedKey};
pub use session::SessionCodec;
pub use session_tokens::SessionTokens;
pub use token_cache::{TokenCoordinator, TokenRefresher};
