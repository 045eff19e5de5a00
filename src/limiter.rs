//! Sliding-window limiter core.
//!
//! Each check reads the `window_minutes + 1` minute buckets for a scope in one
//! multi-get, then increments the current bucket unconditionally, then decides on the
//! total read *before* the increment:
//!
//! - `total < max_requests` allows the request, so exactly `max_requests` requests
//!   pass per window.
//! - Rejected requests are still counted.
//!
//! The read and the increment are separate round-trips. Concurrent requests in the
//! same scope can observe the same total and both pass; this imprecision is accepted
//! rather than closed with a server-side script.
//!
//! Backend failures never fail the request: a failed read counts as zero recorded
//! requests and a failed increment is logged and skipped.

use crate::backend::CounterBackend;
use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// The decision returned by a rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is allowed to proceed.
    Allowed {
        /// Requests recorded in the window before this one.
        total: u64,
        /// Requests still allowed in the window after this one.
        remaining: u64,
    },
    /// The request is over the limit.
    Denied {
        /// Requests recorded in the window before this one.
        total: u64,
        /// The configured budget.
        limit: u64,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Window total observed before this request was recorded.
    pub fn total(&self) -> u64 {
        match self {
            Decision::Allowed { total, .. } | Decision::Denied { total, .. } => *total,
        }
    }
}

/// Core interface for rate limiting logic, keyed by an already-extracted scope.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decide on one request occurrence for `scope` and record it.
    async fn check_and_record(&self, scope: &str) -> Decision;
}

#[async_trait]
impl<T> RateLimiter for Arc<T>
where
    T: RateLimiter + ?Sized,
{
    async fn check_and_record(&self, scope: &str) -> Decision {
        (**self).check_and_record(scope).await
    }
}

/// Rate limiter summing per-minute counters held in a shared cache.
///
/// Clones share the backend handle and clock.
#[derive(Clone)]
pub struct SlidingWindowLimiter<B> {
    backend: Arc<B>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl<B> std::fmt::Debug for SlidingWindowLimiter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("backend", &"<backend>")
            .finish()
    }
}

impl<B> SlidingWindowLimiter<B>
where
    B: CounterBackend + 'static,
{
    /// Create a limiter over `backend` with a validated config.
    pub fn new(backend: B, config: RateLimitConfig) -> Self {
        Self::with_shared_backend(Arc::new(backend), config)
    }

    /// Create a limiter that shares a backend handle with other limiters.
    pub fn with_shared_backend(backend: Arc<B>, config: RateLimitConfig) -> Self {
        Self { backend, config, clock: Arc::new(SystemClock) }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Sum of the window's buckets for `scope`, without recording a request.
    pub async fn window_total(&self, scope: &str) -> u64 {
        let keys = self.config.keys().window_keys(scope, self.clock.now());
        self.read_total(scope, &keys).await
    }

    async fn read_total(&self, scope: &str, keys: &[String]) -> u64 {
        match self.backend.get_many(keys).await {
            Ok(counts) => counts.values().fold(0u64, |acc, n| acc.saturating_add(*n)),
            Err(e) => {
                tracing::warn!(
                    target: "ratelimitcache::backend",
                    scope,
                    error = %e,
                    "counter read failed; treating window as empty"
                );
                0
            }
        }
    }
}

#[async_trait]
impl<B> RateLimiter for SlidingWindowLimiter<B>
where
    B: CounterBackend + 'static,
{
    async fn check_and_record(&self, scope: &str) -> Decision {
        let now = self.clock.now();
        let keys = self.config.keys().window_keys(scope, now);
        let total = self.read_total(scope, &keys).await;

        // window_keys is newest first, so keys[0] is the current bucket.
        if let Err(e) = self.backend.increment(&keys[0], self.config.expire_after()).await {
            tracing::warn!(
                target: "ratelimitcache::backend",
                key = %keys[0],
                error = %e,
                "counter increment failed; request not recorded"
            );
        }

        let limit = self.config.max_requests();
        tracing::debug!(scope, total, limit, "rate limit check");
        if total < limit {
            Decision::Allowed { total, remaining: limit - total - 1 }
        } else {
            Decision::Denied { total, limit }
        }
    }
}
