//! Bucket key scheme.
//!
//! A bucket key is `{prefix}{scope}-{YYYYMMDDHHMM}` with the minute taken in UTC. There
//! is no stored window: a window is the set of keys for the current minute and each of
//! the preceding `window_minutes` minutes, summed at read time. That is
//! `window_minutes + 1` buckets, so a window of N minutes covers slightly more than N
//! minutes of history.

use crate::error::ConfigError;
use chrono::{DateTime, Duration, Utc};
use sha1::{Digest, Sha1};
use std::borrow::Cow;

/// Memcached's cap on the length of a whole key, in bytes.
pub const MAX_KEY_LEN: usize = 250;

/// Length of `-{YYYYMMDDHHMM}`.
const SUFFIX_LEN: usize = 13;

/// Length of a hex SHA-1 digest.
const DIGEST_LEN: usize = 40;

/// Longest accepted prefix: a hashed scope and the suffix must still fit.
pub const MAX_PREFIX_LEN: usize = MAX_KEY_LEN - SUFFIX_LEN - DIGEST_LEN;

/// Longest accepted window; one day of minute buckets.
pub const MAX_WINDOW_MINUTES: u32 = 24 * 60;

const MINUTE_FORMAT: &str = "%Y%m%d%H%M";

/// Derives cache keys for one limiter's keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKeys {
    prefix: String,
    window_minutes: u32,
}

impl BucketKeys {
    /// Validate `prefix` and build a scheme spanning `window_minutes + 1` buckets.
    pub fn new(prefix: impl Into<String>, window_minutes: u32) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        if window_minutes == 0 || window_minutes > MAX_WINDOW_MINUTES {
            return Err(ConfigError::InvalidWindow { provided: window_minutes });
        }
        Ok(Self { prefix, window_minutes })
    }

    /// Skip validation; callers pass known-good constants.
    pub(crate) fn from_parts(prefix: String, window_minutes: u32) -> Self {
        Self { prefix, window_minutes }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key for the minute containing `at`.
    pub fn key_at(&self, scope: &str, at: DateTime<Utc>) -> String {
        format!("{}{}-{}", self.prefix, self.safe_scope(scope), at.format(MINUTE_FORMAT))
    }

    /// Key for the current minute.
    pub fn current_key(&self, scope: &str, now: DateTime<Utc>) -> String {
        self.key_at(scope, now)
    }

    /// Keys for the current minute followed by each of the preceding
    /// `window_minutes` minutes, newest first.
    pub fn window_keys(&self, scope: &str, now: DateTime<Utc>) -> Vec<String> {
        let scope = self.safe_scope(scope);
        (0..=i64::from(self.window_minutes))
            .map(|minutes_ago| {
                let at = now - Duration::minutes(minutes_ago);
                format!("{}{}-{}", self.prefix, scope, at.format(MINUTE_FORMAT))
            })
            .collect()
    }

    /// Scopes that would break a memcached key, or push it past [`MAX_KEY_LEN`], are
    /// replaced by their digest.
    fn safe_scope<'a>(&self, scope: &'a str) -> Cow<'a, str> {
        let fits = self.prefix.len() + scope.len() + SUFFIX_LEN <= MAX_KEY_LEN;
        if fits && !scope.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Cow::Borrowed(scope)
        } else {
            Cow::Owned(sha1_hex(scope))
        }
    }
}

/// Lowercase hex SHA-1 of `value`.
pub fn sha1_hex(value: &str) -> String {
    hex::encode(Sha1::digest(value.as_bytes()))
}

fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    let reason = if prefix.len() > MAX_PREFIX_LEN {
        "longer than 197 bytes"
    } else if prefix.chars().any(char::is_whitespace) {
        "contains whitespace"
    } else if prefix.chars().any(char::is_control) {
        "contains control characters"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidKeyPrefix { prefix: prefix.to_string(), reason })
}
