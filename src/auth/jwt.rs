use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::{config::JwtConfig, state::AppState};

/// Bearer token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,    // user ID
    pub exp: usize,  // expires at (unix timestamp)
    pub iat: usize,  // issued at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Well-formed and correctly signed, but past its expiry.
    #[error("token expired")]
    Expired,
    /// Signature mismatch, wrong issuer/audience or missing claim.
    #[error("token invalid")]
    Invalid,
    /// Structurally broken: not a JWT at all.
    #[error("token malformed")]
    Malformed,
}

/// Holds JWT signing and verification keys with config data. Built once per
/// request from the process-wide secret; the secret itself never leaves
/// `AppConfig`.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    pub fn sign(&self, user_id: i64) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.access_ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        // A signed token missing any of these is invalid, not malformed.
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        // Expiry is exact, no grace window.
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => TokenError::Malformed,
                _ => TokenError::Invalid,
            }
        })?;
        debug!(user_id = data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_roundtrip() {
        let keys = make_keys();
        let token = keys.sign(42).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn expired_token_fails_expired() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: 7,
            iat: (now - 120) as usize,
            exp: (now - 60) as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).expect("encode");
        assert_eq!(keys.verify(&token), Err(TokenError::Expired));
    }

    #[tokio::test]
    async fn tampered_signature_fails_invalid() {
        let keys = make_keys();
        let token = keys.sign(42).expect("sign");
        // Flip the first character of the signature segment.
        let (head, sig) = token.rsplit_once('.').expect("jwt has a signature");
        let flipped = if sig.starts_with('A') { "B" } else { "A" };
        let tampered = format!("{head}.{flipped}{}", &sig[1..]);
        assert_eq!(keys.verify(&tampered), Err(TokenError::Invalid));
    }

    #[tokio::test]
    async fn garbage_fails_malformed() {
        let keys = make_keys();
        assert_eq!(keys.verify("not-a-jwt"), Err(TokenError::Malformed));
        assert_eq!(keys.verify("a.b.c"), Err(TokenError::Malformed));
        assert_eq!(keys.verify(""), Err(TokenError::Malformed));
    }

    #[tokio::test]
    async fn missing_subject_claim_fails_invalid() {
        #[derive(Serialize)]
        struct NoSubject {
            exp: usize,
            iat: usize,
            iss: String,
            aud: String,
        }
        let keys = make_keys();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = NoSubject {
            exp: (now + 300) as usize,
            iat: now as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
        };
        // Correctly signed, so the failure is a missing claim, not corruption.
        let token = encode(&Header::default(), &claims, &keys.encoding).expect("encode");
        assert_eq!(keys.verify(&token), Err(TokenError::Invalid));
    }

    #[tokio::test]
    async fn wrong_secret_fails_invalid() {
        let keys = make_keys();
        let other = JwtKeys {
            encoding: EncodingKey::from_secret(b"other-secret"),
            decoding: DecodingKey::from_secret(b"other-secret"),
            issuer: keys.issuer.clone(),
            audience: keys.audience.clone(),
            access_ttl: keys.access_ttl,
        };
        let token = other.sign(42).expect("sign");
        assert_eq!(keys.verify(&token), Err(TokenError::Invalid));
    }

    #[tokio::test]
    async fn wrong_audience_fails_invalid() {
        let keys = make_keys();
        let mut other = make_keys();
        other.audience = "someone-else".into();
        let token = other.sign(42).expect("sign");
        assert_eq!(keys.verify(&token), Err(TokenError::Invalid));
    }
}
