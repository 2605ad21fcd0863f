//! # JWT Mint and Verify
//!
//! Unlike a user-facing login flow, the proxy mints exactly one token kind
//! per handshake: a bearer carrying the caller's `environment` plus the
//! standard `exp`/`iat`/`iss` claims (§4.4). There is no refresh-token pair
//! here — an SDK re-authenticates with its API key when its token expires.
//!
//! HS256 (HMAC-SHA256) signing, same as the rest of this codebase uses for
//! its own tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::ProxyError;

/// JWT claims issued to an authenticated SDK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The environment this token authorizes access to.
    pub environment: String,
    /// Issuer - identifies the proxy instance that minted the token.
    pub iss: String,
    /// Expiration time as a Unix timestamp.
    pub exp: i64,
    /// Issued-at time as a Unix timestamp.
    pub iat: i64,
}

/// Mints and verifies the single token kind the proxy issues.
///
/// Created once at startup and shared via `Arc`; the underlying keys are
/// immutable after construction.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str, issuer: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl: Duration::seconds(ttl_seconds as i64),
        }
    }

    /// Mints a token for the given environment.
    pub fn mint(&self, environment: &str) -> Result<String, ProxyError> {
        let now = Utc::now();
        let claims = Claims {
            environment: environment.to_string(),
            iss: self.issuer.clone(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(ProxyError::InvalidToken)
    }

    /// Verifies signature and expiry, returning the `environment` claim.
    pub fn verify(&self, token: &str) -> Result<String, ProxyError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = true;

        let token_data: TokenData<Claims> =
            decode(token, &self.decoding_key, &validation).map_err(ProxyError::InvalidToken)?;
        Ok(token_data.claims.environment)
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService").field("issuer", &self.issuer).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new("test_secret_key_minimum_32_chars_required", "flag-proxy", 900)
    }

    #[test]
    fn mint_then_verify_round_trips_the_environment() {
        let jwt = service();
        let token = jwt.mint("env-A").unwrap();
        assert_eq!(jwt.verify(&token).unwrap(), "env-A");
    }

    #[test]
    fn verify_rejects_a_token_signed_with_a_different_secret() {
        let jwt = service();
        let token = jwt.mint("env-A").unwrap();

        let other = JwtService::new("a_completely_different_secret_key_value", "flag-proxy", 900);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_an_expired_token() {
        let jwt = service();

        // Hand-mint a token with a back-dated `exp` well past jsonwebtoken's
        // default 60s leeway, rather than minting with ttl=0 and sleeping:
        // a token only 1-2s past `exp` still falls inside that leeway and
        // would verify successfully, making the assertion flaky/wrong.
        let now = Utc::now();
        let claims = Claims {
            environment: "env-A".to_string(),
            iss: jwt.issuer.clone(),
            exp: (now - Duration::seconds(120)).timestamp(),
            iat: (now - Duration::seconds(1020)).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &jwt.encoding_key).unwrap();

        assert!(jwt.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_a_token_from_a_different_issuer() {
        let jwt = service();
        let token = jwt.mint("env-A").unwrap();

        let other =
            JwtService::new("test_secret_key_minimum_32_chars_required", "other-issuer", 900);
        assert!(other.verify(&token).is_err());
    }
}
