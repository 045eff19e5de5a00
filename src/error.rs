//! Error types for rate limiter configuration and cache backends.
//!
//! Only [`ConfigError`] ever reaches a caller, and only at construction time. A
//! [`BackendError`] is recovered inside the limiter (fail open) and is exposed so cache
//! adapters outside this crate can report failures in a common shape.

/// Errors produced when validating limiter configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// `window_minutes` must be within 1..=1440.
    #[error("window_minutes must be between 1 and 1440 (got {provided})")]
    InvalidWindow {
        /// Value provided by caller.
        provided: u32,
    },
    /// `max_requests` must be > 0.
    #[error("max_requests must be > 0 (got {provided})")]
    InvalidMaxRequests {
        /// Value provided by caller.
        provided: u64,
    },
    /// The key prefix cannot be used inside a memcached-style key.
    #[error("invalid key_prefix {prefix:?}: {reason}")]
    InvalidKeyPrefix {
        /// Prefix provided by caller.
        prefix: String,
        /// What made it unusable.
        reason: &'static str,
    },
}

/// Errors reported by a cache backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendError {
    /// The backend could not be reached or refused the operation.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    /// A stored value under `key` is not an integer counter.
    #[error("cache value under {key:?} is not a counter")]
    InvalidValue {
        /// Offending key.
        key: String,
    },
}

impl BackendError {
    /// Shorthand for [`BackendError::Unavailable`].
    pub fn unavailable(msg: impl Into<String>) -> Self {
        BackendError::Unavailable(msg.into())
    }
}
