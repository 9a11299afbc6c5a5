// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport configuration.
//!
//! Supports both programmatic (builder) and file-based (TOML) configuration.
//!
//! ```toml
//! http_batch_size = 500
//! max_http_parallelism = 4
//! batch_window_ms = 2000
//!
//! [retry]
//! max_attempts = 5
//! base_ms = 200
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables of the save and load pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Objects per HTTP request.
    #[serde(default = "default_http_batch_size")]
    pub http_batch_size: usize,

    /// Concurrent HTTP requests per pipeline.
    #[serde(default = "default_max_http_parallelism")]
    pub max_http_parallelism: usize,

    /// A batch is flushed this long after its first item, even if not full.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    /// Upper bound on the JSON bytes of one upload batch.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    #[serde(default = "default_save_cache_batch_size")]
    pub save_cache_batch_size: usize,

    /// Kept low to avoid write contention on the cache.
    #[serde(default = "default_save_cache_parallelism")]
    pub save_cache_parallelism: usize,

    #[serde(default = "default_load_cache_batch_size")]
    pub load_cache_batch_size: usize,

    #[serde(default = "default_load_cache_parallelism")]
    pub load_cache_parallelism: usize,

    /// Capacity of the load request queue; producers wait when it is full.
    #[serde(default = "default_queue_capacity")]
    pub load_queue_capacity: usize,

    /// Capacity of the save queue; producers wait when it is full.
    #[serde(default = "default_queue_capacity")]
    pub save_queue_capacity: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_http_batch_size() -> usize {
    500
}

fn default_max_http_parallelism() -> usize {
    4
}

fn default_batch_window_ms() -> u64 {
    2000
}

fn default_max_batch_bytes() -> usize {
    25_000_000
}

fn default_save_cache_batch_size() -> usize {
    100
}

fn default_save_cache_parallelism() -> usize {
    1
}

fn default_load_cache_batch_size() -> usize {
    500
}

fn default_load_cache_parallelism() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            http_batch_size: default_http_batch_size(),
            max_http_parallelism: default_max_http_parallelism(),
            batch_window_ms: default_batch_window_ms(),
            max_batch_bytes: default_max_batch_bytes(),
            save_cache_batch_size: default_save_cache_batch_size(),
            save_cache_parallelism: default_save_cache_parallelism(),
            load_cache_batch_size: default_load_cache_batch_size(),
            load_cache_parallelism: default_load_cache_parallelism(),
            load_queue_capacity: default_queue_capacity(),
            save_queue_capacity: default_queue_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("http_batch_size", self.http_batch_size),
            ("max_http_parallelism", self.max_http_parallelism),
            ("max_batch_bytes", self.max_batch_bytes),
            ("save_cache_batch_size", self.save_cache_batch_size),
            ("save_cache_parallelism", self.save_cache_parallelism),
            ("load_cache_batch_size", self.load_cache_batch_size),
            ("load_cache_parallelism", self.load_cache_parallelism),
            ("load_queue_capacity", self.load_queue_capacity),
            ("save_queue_capacity", self.save_queue_capacity),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        self.retry.validate()
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Backoff for transient HTTP failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (ms).
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    /// Delay cap (ms).
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    /// Relative jitter (0.0 - 1.0) applied around each delay.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_ms() -> u64 {
    200
}

fn default_max_ms() -> u64 {
    10_000
}

fn default_jitter_factor() -> f64 {
    0.25
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_ms: default_base_ms(),
            max_ms: default_max_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// No retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::Invalid(
                "retry.jitter_factor must be within 0.0..=1.0".into(),
            ));
        }
        if self.base_ms > self.max_ms {
            return Err(ConfigError::Invalid(
                "retry.base_ms must not exceed retry.max_ms".into(),
            ));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`,
    /// capped, then spread by the jitter factor.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32);
        let delay_ms = self
            .base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_ms);

        let spread = self.jitter_factor * (2.0 * fastrand::f64() - 1.0);
        let jittered = (delay_ms as f64 * (1.0 + spread)).max(0.0);
        Duration::from_millis(jittered as u64)
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    config: Option<TransportConfig>,
}

impl TransportConfigBuilder {
    fn config(&mut self) -> &mut TransportConfig {
        self.config.get_or_insert_with(TransportConfig::default)
    }

    pub fn http_batch_size(mut self, size: usize) -> Self {
        self.config().http_batch_size = size;
        self
    }

    pub fn max_http_parallelism(mut self, parallelism: usize) -> Self {
        self.config().max_http_parallelism = parallelism;
        self
    }

    pub fn batch_window(mut self, window: Duration) -> Self {
        self.config().batch_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn max_batch_bytes(mut self, bytes: usize) -> Self {
        self.config().max_batch_bytes = bytes;
        self
    }

    pub fn save_cache(mut self, batch_size: usize, parallelism: usize) -> Self {
        let config = self.config();
        config.save_cache_batch_size = batch_size;
        config.save_cache_parallelism = parallelism;
        self
    }

    pub fn load_cache(mut self, batch_size: usize, parallelism: usize) -> Self {
        let config = self.config();
        config.load_cache_batch_size = batch_size;
        config.load_cache_parallelism = parallelism;
        self
    }

    pub fn load_queue_capacity(mut self, capacity: usize) -> Self {
        self.config().load_queue_capacity = capacity;
        self
    }

    pub fn save_queue_capacity(mut self, capacity: usize) -> Self {
        self.config().save_queue_capacity = capacity;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config().request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config().retry = retry;
        self
    }

    /// Build and validate.
    pub fn build(mut self) -> Result<TransportConfig, ConfigError> {
        let config = self.config.take().unwrap_or_default();
        config.validate()?;
        Ok(config)
    }
}
