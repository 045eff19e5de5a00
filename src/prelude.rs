//! Convenient re-exports for common ratelimitcache types.
pub use crate::{
    backend::{AtomicCounter, CounterBackend, InMemoryCache, ReadModifyWriteCounter},
    config::{RateLimitConfig, RateLimitSettings},
    limiter::{Decision, RateLimiter, SlidingWindowLimiter},
    middleware::{Forbidden, RateLimitLayer},
    policy::Policy,
    request::{FormRequest, RequestMeta},
    telemetry::{LogSink, MemorySink, RateLimitEvent},
    ConfigError,
};
