#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # ratelimitcache
//!
//! Sliding-window request rate limiting over a shared, expiring cache, packaged as
//! tower middleware. Built for protecting endpoints such as login forms from
//! brute-force attempts.
//!
//! ## How it works
//!
//! - Each request is counted in a per-minute bucket keyed by
//!   `{prefix}{scope}-{YYYYMMDDHHMM}` (UTC).
//! - A decision sums the current bucket and the preceding `window_minutes` buckets in a
//!   single multi-get, then increments the current bucket, allowed or not.
//! - The request passes while that pre-increment total is below `max_requests`.
//! - Buckets expire on their own after `(window_minutes + 1) * 60` seconds.
//! - If the cache is unreachable the limiter fails open.
//!
//! ## Quick Start
//!
//! ```rust
//! use ratelimitcache::{
//!     AtomicCounter, Forbidden, FormRequest, InMemoryCache, Policy, RateLimitConfig,
//!     RateLimitLayer, SlidingWindowLimiter,
//! };
//! use tower::ServiceExt;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = RateLimitConfig::builder().window_minutes(1).max_requests(2).build().unwrap();
//! let limiter = SlidingWindowLimiter::new(AtomicCounter::new(InMemoryCache::new()), config);
//!
//! let guard = RateLimitLayer::<_, FormRequest, (u16, String)>::new(limiter)
//!     .policy(Policy::post_field("username"));
//! let login = guard.wrap(|_req: FormRequest| async {
//!     Ok::<_, std::convert::Infallible>((200, "welcome".to_string()))
//! });
//!
//! let attempt = || FormRequest::post("10.0.0.7").field("username", "alice");
//! assert_eq!(login.clone().oneshot(attempt()).await.unwrap().0, 200);
//! assert_eq!(login.clone().oneshot(attempt()).await.unwrap().0, 200);
//! assert_eq!(login.clone().oneshot(attempt()).await.unwrap().0, Forbidden::STATUS);
//! # });
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod limiter;
pub mod middleware;
pub mod policy;
pub mod prelude;
pub mod request;
pub mod telemetry;

// Re-exports
pub use backend::{
    AtomicCacheStore, AtomicCounter, CacheStore, CounterBackend, InMemoryCache,
    ReadModifyWriteCounter,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RateLimitConfig, RateLimitConfigBuilder, RateLimitSettings};
pub use error::{BackendError, ConfigError};
pub use keys::BucketKeys;
pub use limiter::{Decision, RateLimiter, SlidingWindowLimiter};
pub use middleware::{Forbidden, RateLimitLayer, RateLimitService};
pub use policy::Policy;
pub use request::{FormRequest, RequestMeta};
