//! HS256 access tokens.
//!
//! Tokens are issued by the HTTP side of the application; the presence
//! server only verifies them. Claims: `email`, `userId`, `iat`, `exp`.

use crate::error::{CircleError, CircleResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Decoded access-token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

/// Create an access token valid for `ttl_secs` seconds.
pub fn create_access_token(
    secret: &[u8],
    user_id: &str,
    email: &str,
    ttl_secs: i64,
) -> CircleResult<String> {
    let now = Utc::now().timestamp();
    let claims = AccessClaims {
        email: Some(email.to_string()),
        user_id: Some(user_id.to_string()),
        iat: now,
        exp: now + ttl_secs,
    };
    sign_claims(secret, &claims)
}

/// Sign arbitrary claims. Exposed so callers can mint tokens with unusual
/// shapes (e.g. without an email) for testing.
pub fn sign_claims(secret: &[u8], claims: &AccessClaims) -> CircleResult<String> {
    encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret))
        .map_err(|e| CircleError::Other(format!("token encode failed: {e}")))
}

/// Verify an access token's signature and expiry.
pub fn verify_access_token(secret: &[u8], token: &str) -> CircleResult<AccessClaims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<AccessClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|_| CircleError::auth("token", "Invalid token"))
}
