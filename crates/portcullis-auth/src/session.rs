//! Session codec: signs and verifies the session cookie artifact.
//!
//! Artifacts are HS256 JWTs whose payload is the flattened [`SessionClaims`]
//! plus `iat`/`exp`. Verification pins the algorithm and checks expiry
//! against the injected clock with zero leeway.

use crate::error::SessionError;
use crate::keys::ResolvedKey;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use portcullis_domain::{Clock, Session, SessionClaims};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default session lifetime: 7 days
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Signs and verifies session artifacts
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl SessionCodec {
    /// Create a codec with the given secret and clock
    pub fn new(secret: &str, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // exp is enforced against `clock` in `decode`
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock,
        }
    }

    /// Create a codec from a resolved key
    pub fn from_key(key: &ResolvedKey, clock: Arc<dyn Clock>) -> Self {
        Self::new(key.secret(), clock)
    }

    /// Sign `claims` into an artifact that expires `ttl` from now
    pub fn encode(&self, claims: &SessionClaims, ttl: Duration) -> Result<String, SessionError> {
        if ttl.is_zero() {
            return Err(SessionError::InvalidTtl);
        }

        let now = self.clock.now_secs();
        let session = Session {
            claims: claims.clone(),
            issued_at: now,
            expires_at: now.saturating_add(ttl.as_secs()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &session, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify and decode an artifact
    ///
    /// Returns `None` for any signature, algorithm, format or expiry failure;
    /// callers cannot distinguish an expired artifact from an absent one.
    pub fn decode(&self, artifact: &str) -> Option<Session> {
        let artifact = artifact.trim();
        if artifact.is_empty() {
            return None;
        }

        let session = match decode::<Session>(artifact, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(reason = ?e.kind(), "Rejected session artifact");
                return None;
            }
        };

        if session.is_expired_at(self.clock.now_secs()) {
            debug!(user_id = %session.claims.user_id, "Session artifact expired");
            return None;
        }

        Some(session)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use portcullis_domain::ManualClock;
    use proptest::prelude::*;

    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.";

    fn claims_strategy() -> impl Strategy<Value = SessionClaims> {
        (
            "[a-z0-9-]{1,24}",
            "[a-z]{1,12}@[a-z]{1,8}\\.com",
            proptest::option::of("[a-z0-9]{1,12}"),
            prop_oneof![Just("admin"), Just("member"), Just("viewer")],
            "[A-Za-z0-9._-]{8,64}",
            proptest::option::of("[A-Za-z0-9._-]{8,64}"),
            proptest::collection::vec("[a-z:]{1,16}", 0..4),
        )
            .prop_map(|(user, email, tenant, role, access, refresh, permissions)| {
                SessionClaims::new(user, email, role, access)
                    .with_tenant(tenant)
                    .with_refresh_token(refresh)
                    .with_permissions(permissions)
            })
    }

    proptest! {
        /// Property: decode(encode(c, t)) == c before t elapses, None strictly after
        #[test]
        fn test_round_trip_until_expiry(claims in claims_strategy(), ttl in 1u64..1_000_000u64) {
            let clock = Arc::new(ManualClock::at_secs(1_700_000_000));
            let codec = SessionCodec::new("prop-secret", clock.clone());
            let token = codec.encode(&claims, Duration::from_secs(ttl)).unwrap();

            let decoded = codec.decode(&token);
            prop_assert_eq!(decoded.map(|s| s.claims), Some(claims));

            clock.advance_secs(ttl + 1);
            prop_assert!(codec.decode(&token).is_none());
        }

        /// Property: replacing any single character invalidates the artifact
        #[test]
        fn test_tamper_rejection(
            claims in claims_strategy(),
            index in any::<prop::sample::Index>(),
            replacement in 0usize..ALPHABET.len(),
        ) {
            let clock = Arc::new(ManualClock::at_secs(1_700_000_000));
            let codec = SessionCodec::new("prop-secret", clock);
            let token = codec.encode(&claims, DEFAULT_SESSION_TTL).unwrap();

            let mut bytes = token.into_bytes();
            let i = index.index(bytes.len());
            let mut new_byte = ALPHABET[replacement];
            if new_byte == bytes[i] {
                new_byte = ALPHABET[(replacement + 1) % ALPHABET.len()];
            }
            bytes[i] = new_byte;
            let tampered = String::from_utf8(bytes).unwrap();

            prop_assert!(codec.decode(&tampered).is_none());
        }
    }
}
