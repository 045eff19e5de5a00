//! Limiter configuration.
//!
//! [`RateLimitConfig`] is validated once and immutable afterwards. Operators can also
//! describe it as [`RateLimitSettings`] (deserializable with the `serde` feature) and
//! convert with `TryFrom`, which runs the same validation.

use crate::error::ConfigError;
use crate::keys::BucketKeys;
use std::time::Duration;

/// Default rolling window, in minutes.
pub const DEFAULT_WINDOW_MINUTES: u32 = 2;
/// Default number of requests allowed per window.
pub const DEFAULT_MAX_REQUESTS: u64 = 20;
/// Default cache key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "rl-";

/// Validated limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    window_minutes: u32,
    max_requests: u64,
    keys: BucketKeys,
}

impl RateLimitConfig {
    /// Create a config with validation.
    ///
    /// # Examples
    /// ```
    /// use ratelimitcache::RateLimitConfig;
    /// let config = RateLimitConfig::new(1, 5, "login-").unwrap();
    /// assert_eq!(config.expire_after().as_secs(), 120);
    /// assert!(RateLimitConfig::new(0, 5, "login-").is_err());
    /// ```
    pub fn new(
        window_minutes: u32,
        max_requests: u64,
        key_prefix: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::InvalidMaxRequests { provided: max_requests });
        }
        let keys = BucketKeys::new(key_prefix, window_minutes)?;
        Ok(Self { window_minutes, max_requests, keys })
    }

    /// Construct a builder starting from the defaults.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }

    /// Length of the rolling window.
    pub fn window_minutes(&self) -> u32 {
        self.window_minutes
    }

    /// Requests allowed within the window before rejection.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn key_prefix(&self) -> &str {
        self.keys.prefix()
    }

    /// Key scheme for this limiter's keyspace.
    pub fn keys(&self) -> &BucketKeys {
        &self.keys
    }

    /// Number of minute buckets summed per decision.
    pub fn bucket_count(&self) -> usize {
        self.window_minutes as usize + 1
    }

    /// Cache expiry for a bucket: one minute longer than the window.
    pub fn expire_after(&self) -> Duration {
        Duration::from_secs((u64::from(self.window_minutes) + 1) * 60)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_minutes: DEFAULT_WINDOW_MINUTES,
            max_requests: DEFAULT_MAX_REQUESTS,
            keys: BucketKeys::from_parts(DEFAULT_KEY_PREFIX.to_string(), DEFAULT_WINDOW_MINUTES),
        }
    }
}

/// Builder for [`RateLimitConfig`].
#[derive(Debug, Clone)]
pub struct RateLimitConfigBuilder {
    window_minutes: u32,
    max_requests: u64,
    key_prefix: String,
}

impl RateLimitConfigBuilder {
    /// Create a builder with the defaults (2 minutes, 20 requests, `rl-`).
    pub fn new() -> Self {
        Self {
            window_minutes: DEFAULT_WINDOW_MINUTES,
            max_requests: DEFAULT_MAX_REQUESTS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Set the window length in minutes. Must be within 1..=1440.
    pub fn window_minutes(mut self, minutes: u32) -> Self {
        self.window_minutes = minutes;
        self
    }

    /// Set the request budget per window. Must be > 0.
    pub fn max_requests(mut self, max: u64) -> Self {
        self.max_requests = max;
        self
    }

    /// Namespace for this limiter's cache keys.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Build the config, validating inputs.
    pub fn build(self) -> Result<RateLimitConfig, ConfigError> {
        RateLimitConfig::new(self.window_minutes, self.max_requests, self.key_prefix)
    }
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Unvalidated, operator-facing form of [`RateLimitConfig`]. Missing fields take the
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct RateLimitSettings {
    pub window_minutes: u32,
    pub max_requests: u64,
    pub key_prefix: String,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_minutes: DEFAULT_WINDOW_MINUTES,
            max_requests: DEFAULT_MAX_REQUESTS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl TryFrom<RateLimitSettings> for RateLimitConfig {
    type Error = ConfigError;

    fn try_from(settings: RateLimitSettings) -> Result<Self, Self::Error> {
        RateLimitConfig::new(settings.window_minutes, settings.max_requests, settings.key_prefix)
    }
}

impl From<&RateLimitConfig> for RateLimitSettings {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            window_minutes: config.window_minutes(),
            max_requests: config.max_requests(),
            key_prefix: config.key_prefix().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let config = RateLimitConfig::default();
        assert_eq!(config.window_minutes(), 2);
        assert_eq!(config.max_requests(), 20);
        assert_eq!(config.key_prefix(), "rl-");
        assert_eq!(config.bucket_count(), 3);
        assert_eq!(config.expire_after(), Duration::from_secs(180));
        assert_eq!(RateLimitConfig::builder().build().unwrap(), config);
    }

    #[test]
    fn builder_overrides_fields() {
        let config = RateLimitConfig::builder()
            .window_minutes(5)
            .max_requests(3)
            .key_prefix("login-")
            .build()
            .unwrap();
        assert_eq!(config.window_minutes(), 5);
        assert_eq!(config.max_requests(), 3);
        assert_eq!(config.key_prefix(), "login-");
        assert_eq!(config.expire_after(), Duration::from_secs(360));
    }

    #[test]
    fn rejects_zero_values_eagerly() {
        assert_eq!(
            RateLimitConfig::new(0, 10, "rl-"),
            Err(ConfigError::InvalidWindow { provided: 0 })
        );
        assert_eq!(
            RateLimitConfig::new(1, 0, "rl-"),
            Err(ConfigError::InvalidMaxRequests { provided: 0 })
        );
        assert!(RateLimitConfig::builder().key_prefix("has space").build().is_err());
        assert_eq!(
            RateLimitConfig::new(u32::MAX, 5, "rl-"),
            Err(ConfigError::InvalidWindow { provided: u32::MAX })
        );
        assert!(RateLimitConfig::new(1440, 5, "rl-").is_ok());
    }

    #[test]
    fn settings_round_trip_through_validation() {
        let settings =
            RateLimitSettings { window_minutes: 1, max_requests: 2, ..Default::default() };
        let config = RateLimitConfig::try_from(settings.clone()).unwrap();
        assert_eq!(RateLimitSettings::from(&config), settings);

        let bad = RateLimitSettings { max_requests: 0, ..Default::default() };
        assert!(RateLimitConfig::try_from(bad).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: RateLimitSettings =
            serde_json::from_str(r#"{ "max_requests": 5, "key_prefix": "login-" }"#).unwrap();
        assert_eq!(settings.window_minutes, DEFAULT_WINDOW_MINUTES);
        assert_eq!(settings.max_requests, 5);
        assert_eq!(settings.key_prefix, "login-");

        let unknown = serde_json::from_str::<RateLimitSettings>(r#"{ "minutes": 5 }"#);
        assert!(unknown.is_err());
    }
}
