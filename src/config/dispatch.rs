//! Campaign dispatch configuration

use serde::Deserialize;
use std::time::Duration;

use crate::domain::campaign::RateLimit;
use crate::domain::foundation::ExponentialBackoff;

use super::error::ValidationError;

/// Scanner cadence, page size, retry policy and default pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Seconds between scanner ticks
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Contacts fetched per page
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Send attempts per contact, and cursor write attempts per page
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Seconds a stopped worker gets to drain its page
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// Failed worker runs in a row before the campaign is marked Failed
    #[serde(default = "default_max_worker_failures")]
    pub max_worker_failures: u32,

    /// Pacing for campaigns that carry no usable rate limit
    #[serde(default = "default_rate_messages")]
    pub default_rate_messages: u32,

    #[serde(default = "default_rate_interval")]
    pub default_rate_interval_ms: u64,
}

impl DispatchConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn retry_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.backoff_initial_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }

    pub fn default_rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.default_rate_messages,
            Duration::from_millis(self.default_rate_interval_ms),
        )
    }

    /// Validate dispatch configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let positive = [
            ("dispatch.scan_interval_secs", self.scan_interval_secs),
            ("dispatch.batch_size", u64::from(self.batch_size)),
            ("dispatch.max_attempts", u64::from(self.max_attempts)),
            ("dispatch.max_worker_failures", u64::from(self.max_worker_failures)),
            ("dispatch.backoff_initial_ms", self.backoff_initial_ms),
            ("dispatch.default_rate_messages", u64::from(self.default_rate_messages)),
            ("dispatch.default_rate_interval_ms", self.default_rate_interval_ms),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ValidationError::MustBePositive { field });
        }
        if self.backoff_initial_ms > self.backoff_max_ms {
            return Err(ValidationError::InvertedBounds {
                lower: "dispatch.backoff_initial_ms",
                upper: "dispatch.backoff_max_ms",
            });
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
            stop_grace_secs: default_stop_grace(),
            max_worker_failures: default_max_worker_failures(),
            default_rate_messages: default_rate_messages(),
            default_rate_interval_ms: default_rate_interval(),
        }
    }
}

fn default_scan_interval() -> u64 {
    5
}

fn default_batch_size() -> u32 {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_initial() -> u64 {
    200
}

fn default_backoff_max() -> u64 {
    10_000
}

fn default_stop_grace() -> u64 {
    10
}

fn default_max_worker_failures() -> u32 {
    3
}

fn default_rate_messages() -> u32 {
    20
}

fn default_rate_interval() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DispatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan_interval(), Duration::from_secs(5));
        assert_eq!(config.default_rate_limit(), RateLimit::per_second(20));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = DispatchConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MustBePositive {
                field: "dispatch.batch_size"
            })
        );
    }

    #[test]
    fn zero_worker_failure_bound_is_rejected() {
        let config = DispatchConfig {
            max_worker_failures: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MustBePositive {
                field: "dispatch.max_worker_failures"
            })
        );
    }

    #[test]
    fn inverted_backoff_is_rejected() {
        let config = DispatchConfig {
            backoff_initial_ms: 5_000,
            backoff_max_ms: 100,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvertedBounds { .. })
        ));
    }
}
