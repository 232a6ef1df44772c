//! Access-token verification and auth-attempt throttling.

pub mod rate_limit;
pub mod verifier;

pub use rate_limit::RateLimiter;
pub use verifier::{JwtVerifier, TokenVerifier};
