//! Redis configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::ports::EVENTS_CHANNEL;

/// Redis pub/sub configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Channel carrying domain events from producers to the hub
    #[serde(default = "default_events_channel")]
    pub events_channel: String,
}

impl RedisConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate Redis configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("REDIS_URL"));
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ValidationError::InvalidRedisUrl);
        }
        if self.events_channel.trim().is_empty() {
            return Err(ValidationError::MissingRequired("REDIS_EVENTS_CHANNEL"));
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_timeout(),
            events_channel: default_events_channel(),
        }
    }
}

fn default_timeout() -> u64 {
    5
}

fn default_events_channel() -> String {
    EVENTS_CHANNEL.to_string()
}
