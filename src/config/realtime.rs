//! Real-time (WebSocket) configuration

use serde::Deserialize;
use std::time::Duration;

use crate::domain::foundation::ExponentialBackoff;

use super::error::ValidationError;

/// Per-connection buffering and timeouts, plus bus resubscribe pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Outbound envelopes buffered per connection before events are dropped
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Connections silent for this long are closed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_resubscribe_initial")]
    pub resubscribe_initial_ms: u64,

    #[serde(default = "default_resubscribe_max")]
    pub resubscribe_max_ms: u64,
}

impl RealtimeConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn resubscribe_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.resubscribe_initial_ms),
            Duration::from_millis(self.resubscribe_max_ms),
        )
    }

    /// Validate real-time configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.outbound_buffer == 0 {
            return Err(ValidationError::MustBePositive {
                field: "realtime.outbound_buffer",
            });
        }
        if self.write_timeout_secs == 0 {
            return Err(ValidationError::MustBePositive {
                field: "realtime.write_timeout_secs",
            });
        }
        if self.idle_timeout_secs == 0 {
            return Err(ValidationError::MustBePositive {
                field: "realtime.idle_timeout_secs",
            });
        }
        if self.resubscribe_initial_ms > self.resubscribe_max_ms {
            return Err(ValidationError::InvertedBounds {
                lower: "realtime.resubscribe_initial_ms",
                upper: "realtime.resubscribe_max_ms",
            });
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            write_timeout_secs: default_write_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            resubscribe_initial_ms: default_resubscribe_initial(),
            resubscribe_max_ms: default_resubscribe_max(),
        }
    }
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_write_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_resubscribe_initial() -> u64 {
    500
}

fn default_resubscribe_max() -> u64 {
    30_000
}
