use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;

/// Claims carried by the compact signed bearer token: the
/// subscriber's opaque identifier plus issue/expiry timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the subscriber's id.
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    /// Carried so a super-user token can be recognized without a further
    /// Identity Store round trip on the hot path (e.g. the operator
    /// metrics channel's authorization check).
    pub superuser: bool,
}

/// Issues and verifies access tokens. One instance per process, built from
/// configuration; stateless beyond that (no server-side session store for
/// the token itself — revocation is out of scope).
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: jsonwebtoken::Algorithm,
    ttl: Duration,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            algorithm: config.jwt_algorithm,
            ttl: Duration::minutes(config.access_token_ttl_minutes),
        }
    }

    pub fn issue(&self, subscriber_id: Uuid, superuser: bool, now: DateTime<Utc>) -> Result<String, AppError> {
        let claims = Claims {
            sub: subscriber_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            superuser,
        };
        encode(&Header::new(self.algorithm), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "token encoding failed");
            AppError::Internal
        })
    }

    /// Verifies signature and expiry, returning the carried claims.
    /// Any failure — malformed, expired, badly signed — collapses to
    /// `Unauthenticated`, refusing to leak which check failed.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthenticated)
    }
}
