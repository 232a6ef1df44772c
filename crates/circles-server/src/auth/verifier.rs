//! Token verification seam.

use circles_core::{verify_access_token, AccessClaims, CircleResult};

/// Turns a bearer token into claims. Failures are `CircleError::Auth` on
/// field `token`.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> CircleResult<AccessClaims>;
}

/// HS256 verifier sharing the secret with the HTTP side.
pub struct JwtVerifier {
    secret: Vec<u8>,
}

impl JwtVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> CircleResult<AccessClaims> {
        verify_access_token(&self.secret, token.trim())
    }
}
