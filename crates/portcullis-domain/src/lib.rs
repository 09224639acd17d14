//! Portcullis Domain Layer
//!
//! Value types shared by the authentication edge: the signed session claim
//! set, the downstream token pair, the deployment environment flag and the
//! clock abstraction used for every expiry decision.
//!
//! ## Key Concepts
//!
//! - **Session**: claims minted at login, carried client-side as a signed cookie
//! - **TokenPair**: the identity provider's access/refresh pair, process memory only
//! - **Environment**: `production` vs everything else; governs secret fallbacks
//! - **Clock**: injectable time source so expiry logic is testable
//!
//! ## Architecture
//!
//! No I/O and no crypto live here. Codecs, HTTP clients and the gateway are
//! infrastructure crates that depend on these types.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod environment;
pub mod session;
pub mod token;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use environment::Environment;
pub use session::{OnboardingStatus, Session, SessionClaims, CREATE_BUSINESS_STEP};
pub use token::{TokenGrant, TokenPair};
