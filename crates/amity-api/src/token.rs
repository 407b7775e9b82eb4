use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use amity_types::api::Claims;
use amity_types::models::Role;

use crate::error::ApiError;

/// Signs and verifies the bearer tokens. One symmetric HS256 secret, decoded
/// once from its base64 form at startup so issue and verify can never disagree
/// on key material. TTL is explicit configuration.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(base64_secret: &str, ttl_secs: i64) -> anyhow::Result<Self> {
        let key = B64
            .decode(base64_secret.trim())
            .context("AMITY_JWT_SECRET is not valid base64")?;
        Ok(Self {
            encoding: EncodingKey::from_secret(&key),
            decoding: DecodingKey::from_secret(&key),
            ttl: Duration::seconds(ttl_secs),
        })
    }

    pub fn issue(&self, subject: &str, role: Role) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok(token)
    }

    /// Signature and claim-structure validation only. Expiry is checked
    /// separately with `is_expired` so the request path can treat an expired
    /// token as absent credentials rather than a tampered one.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::InvalidToken)
    }

    pub fn extract_subject(&self, token: &str) -> Result<String, ApiError> {
        Ok(self.verify(token)?.sub)
    }

    pub fn is_expired(&self, claims: &Claims) -> bool {
        (claims.exp as i64) < Utc::now().timestamp()
    }
}
