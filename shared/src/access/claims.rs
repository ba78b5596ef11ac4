//! Session-token decoding.
//!
//! Decoding is structural plus signature verification: expiry is checked
//! separately with [`is_expired`] so the strict `exp < now` rule is applied
//! in one place, and business rules (is the role valid?) are left to the
//! decision engine.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use tracing::debug;

use super::AccessError;
use crate::types::Claims;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token signature does not verify")]
    BadSignature,
}

#[derive(Error, Debug)]
#[error("failed to sign token: {0}")]
pub struct SignError(#[from] jsonwebtoken::errors::Error);

/// Seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `exp < now`, epoch seconds.
pub fn is_expired(claims: &Claims, now: i64) -> bool {
    claims.exp < now
}

// ---------------------------------------------------------------------------
// TokenState
// ---------------------------------------------------------------------------

/// What a request's token amounts to once decoded and checked for expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Missing,
    Malformed,
    Expired,
    Valid(Claims),
}

impl TokenState {
    pub fn claims(&self) -> Option<&Claims> {
        match self {
            TokenState::Valid(c) => Some(c),
            _ => None,
        }
    }

    /// A token was present but cannot be used. Callers clear storage on this.
    pub fn is_rejected(&self) -> bool {
        matches!(self, TokenState::Malformed | TokenState::Expired)
    }

    pub fn fault(&self) -> Option<AccessError> {
        match self {
            TokenState::Missing => Some(AccessError::TokenMissing),
            TokenState::Malformed => Some(AccessError::TokenMalformed),
            TokenState::Expired => Some(AccessError::TokenExpired),
            TokenState::Valid(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ClaimDecoder
// ---------------------------------------------------------------------------

/// Verifies HS256 session tokens and extracts their [`Claims`].
#[derive(Clone)]
pub struct ClaimDecoder {
    key: DecodingKey,
    validation: Validation,
}

impl ClaimDecoder {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged by `is_expired`; `exp` must still be present.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn decode(&self, raw: &str) -> Result<Claims, DecodeError> {
        decode::<Claims>(raw, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => DecodeError::BadSignature,
                _ => DecodeError::Malformed(e.to_string()),
            })
    }

    /// Decode and check expiry in one step. Never fails: every problem is a
    /// [`TokenState`].
    pub fn evaluate(&self, raw: Option<&str>, now: i64) -> TokenState {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return TokenState::Missing;
        };

        match self.decode(raw) {
            Ok(claims) if is_expired(&claims, now) => {
                debug!("Token for {} expired at {}", claims.user_id, claims.exp);
                TokenState::Expired
            }
            Ok(claims) => TokenState::Valid(claims),
            Err(e) => {
                debug!("Token rejected: {}", e);
                TokenState::Malformed
            }
        }
    }
}

impl std::fmt::Debug for ClaimDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimDecoder")
            .field("algorithm", &Algorithm::HS256)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TokenSigner
// ---------------------------------------------------------------------------

/// Issuing side of [`ClaimDecoder`]. Production tokens come from the
/// authentication API; this exists for local development and tests.
#[derive(Clone)]
pub struct TokenSigner {
    key: EncodingKey,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, SignError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    const SECRET: &str = "test-secret-key-that-is-long-enough-for-testing";

    fn signed(claims: &Claims) -> String {
        TokenSigner::new(SECRET).sign(claims).unwrap()
    }

    #[test]
    fn decodes_signed_token() {
        let c = Claims::new("a1", Role::Admin, unix_now() + 60).with_master(true);
        let decoded = ClaimDecoder::new(SECRET).decode(&signed(&c)).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn decode_does_not_check_expiry() {
        let c = Claims::new("a1", Role::Student, 1);
        assert!(ClaimDecoder::new(SECRET).decode(&signed(&c)).is_ok());
    }

    #[test]
    fn garbage_is_malformed() {
        let err = ClaimDecoder::new(SECRET).decode("not-a-token").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn wrong_secret_is_bad_signature() {
        let c = Claims::new("a1", Role::Admin, unix_now() + 60);
        let token = TokenSigner::new("another-secret-that-is-also-long-enough")
            .sign(&c)
            .unwrap();
        assert_eq!(
            ClaimDecoder::new(SECRET).decode(&token).unwrap_err(),
            DecodeError::BadSignature
        );
    }

    #[test]
    fn expiry_is_strict() {
        let c = Claims::new("a1", Role::Admin, 100);
        assert!(!is_expired(&c, 100));
        assert!(is_expired(&c, 101));
    }

    #[test]
    fn evaluate_maps_every_outcome() {
        let d = ClaimDecoder::new(SECRET);
        let now = 1_000;
        let live = Claims::new("s", Role::Student, now + 1);
        let dead = Claims::new("s", Role::Student, now - 1);

        assert_eq!(d.evaluate(None, now), TokenState::Missing);
        assert_eq!(d.evaluate(Some(""), now), TokenState::Missing);
        assert_eq!(d.evaluate(Some("x.y.z"), now), TokenState::Malformed);
        assert_eq!(d.evaluate(Some(&signed(&dead)), now), TokenState::Expired);
        assert_eq!(
            d.evaluate(Some(&signed(&live)), now),
            TokenState::Valid(live)
        );
    }

    #[test]
    fn issuer_tokens_with_duplicate_id_keys_are_valid() {
        let payload = serde_json::json!({
            "id": "a7",
            "userId": "a7",
            "role": "admin",
            "isMaster": false,
            "exp": unix_now() + 60,
            "iat": unix_now(),
        });
        let raw = encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        match ClaimDecoder::new(SECRET).evaluate(Some(&raw), unix_now()) {
            TokenState::Valid(c) => {
                assert_eq!(c.user_id, "a7");
                assert!(c.is_admin());
            }
            other => panic!("expected a valid session, got {:?}", other),
        }
    }

    #[test]
    fn rejected_states_carry_faults() {
        assert!(TokenState::Expired.is_rejected());
        assert!(!TokenState::Missing.is_rejected());
        assert_eq!(TokenState::Missing.fault(), Some(AccessError::TokenMissing));
    }
}
