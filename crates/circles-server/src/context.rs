//! State shared by every connection handler.

use crate::auth::{RateLimiter, TokenVerifier};
use crate::presence::{NotificationBridge, Presence};
use crate::store::CircleStore;
use circles_core::{CircleError, CircleResult};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_AUTH_ATTEMPTS_PER_MINUTE: u32 = 5;

pub struct ServerContext {
    pub presence: Arc<Presence>,
    pub store: Arc<dyn CircleStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// `authenticate` attempts per remote address.
    pub auth_limits: Mutex<RateLimiter>,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
}

impl ServerContext {
    pub fn new(store: Arc<dyn CircleStore>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            presence: Arc::new(Presence::new()),
            store,
            verifier,
            auth_limits: Mutex::new(RateLimiter::per_minute(DEFAULT_AUTH_ATTEMPTS_PER_MINUTE)),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_auth_limit(mut self, per_minute: u32) -> Self {
        self.auth_limits = Mutex::new(RateLimiter::per_minute(per_minute));
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn bridge(&self) -> NotificationBridge {
        NotificationBridge::new(self.presence.clone())
    }

    /// Run a store call under [`Self::store_timeout`].
    pub async fn bounded<T, F>(&self, op: &'static str, call: F) -> CircleResult<T>
    where
        F: Future<Output = CircleResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(op, error = %e, "store call failed");
                Err(e)
            }
            Err(_) => {
                warn!(op, timeout_ms = self.store_timeout.as_millis() as u64, "store call timed out");
                Err(CircleError::Timeout)
            }
        }
    }

    /// Record an auth attempt. Connections without a known peer address are
    /// never throttled.
    pub async fn allow_auth_attempt(&self, remote: Option<IpAddr>) -> bool {
        match remote {
            Some(ip) => self.auth_limits.lock().await.check_and_record(ip),
            None => true,
        }
    }
}
