//! Messaging API client configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Settings for the outbound messaging (cloud) API.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    /// Base URL of the Graph-style messaging API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API version path segment, e.g. `v19.0`
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl MessagingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate messaging configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.base_url.is_empty() {
            return Err(ValidationError::MissingRequired("MESSAGING_BASE_URL"));
        }
        if *environment == Environment::Production && !self.base_url.starts_with("https://") {
            return Err(ValidationError::MessagingUrlMustBeHttps);
        }
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::MustBePositive {
                field: "messaging.request_timeout_secs",
            });
        }
        Ok(())
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v19.0".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_in_production() {
        assert!(MessagingConfig::default()
            .validate(&Environment::Production)
            .is_ok());
    }

    #[test]
    fn plain_http_is_rejected_in_production_only() {
        let config = MessagingConfig {
            base_url: "http://localhost:9000".to_string(),
            ..Default::default()
        };
        assert!(config.validate(&Environment::Development).is_ok());
        assert_eq!(
            config.validate(&Environment::Production),
            Err(ValidationError::MessagingUrlMustBeHttps)
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = MessagingConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate(&Environment::Development).is_err());
    }
}
