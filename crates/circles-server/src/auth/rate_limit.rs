//! Sliding-window limiter for `authenticate` attempts.
//!
//! Each remote address keeps the instants of its recent attempts; anything
//! older than the window is discarded on the next check or by [`RateLimiter::gc`].

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    /// Attempts allowed per window. Zero disables limiting.
    max_attempts: u32,
    window: Duration,
    entries: HashMap<IpAddr, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            entries: HashMap::new(),
        }
    }

    pub fn per_minute(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::from_secs(60))
    }

    /// Record an attempt from `addr` if it is within budget.
    ///
    /// Returns `false` (and records nothing) when the address is over its limit.
    pub fn check_and_record(&mut self, addr: IpAddr) -> bool {
        self.check_and_record_at(addr, Instant::now())
    }

    fn check_and_record_at(&mut self, addr: IpAddr, now: Instant) -> bool {
        if self.max_attempts == 0 {
            return true;
        }
        let attempts = self.entries.entry(addr).or_default();
        if let Some(cutoff) = now.checked_sub(self.window) {
            while attempts.front().is_some_and(|t| *t <= cutoff) {
                attempts.pop_front();
            }
        }
        if attempts.len() as u32 >= self.max_attempts {
            return false;
        }
        attempts.push_back(now);
        true
    }

    /// Drop addresses with no attempts inside the window.
    pub fn gc(&mut self) {
        let Some(cutoff) = Instant::now().checked_sub(self.window) else {
            return;
        };
        self.entries.retain(|_, attempts| {
            attempts.retain(|t| *t > cutoff);
            !attempts.is_empty()
        });
    }

    /// Number of addresses currently tracked.
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}
