//! Messaging API port.
//!
//! A client is bound to one sending account. The scanner asks a
//! `MessagingClientFactory` for a client when it starts a campaign; a
//! factory error means the account cannot send at all.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::campaign::{AccountCredentials, TemplateMessage};
use crate::domain::foundation::ExternalMessageId;

/// Failures reported by the messaging API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessagingApiError {
    /// Connection, TLS or timeout failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The API throttled the request (HTTP 429).
    #[error("rate limited by messaging API")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Upstream 5xx.
    #[error("messaging API server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The request was rejected as invalid (4xx).
    #[error("messaging API rejected request ({status}): {message}")]
    Validation { status: u16, message: String },

    /// Token rejected (401/403).
    #[error("messaging API authorization failed: {0}")]
    Unauthorized(String),

    /// Credentials are unusable; raised when building a client.
    #[error("invalid account credentials: {0}")]
    InvalidCredentials(String),
}

impl MessagingApiError {
    /// Returns true if the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MessagingApiError::Transport(_)
                | MessagingApiError::RateLimited { .. }
                | MessagingApiError::Server { .. }
        )
    }

    /// Server-requested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MessagingApiError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Client for a single sending account.
#[async_trait]
pub trait MessagingApiClient: Send + Sync {
    /// Send a pre-approved template to a phone number.
    ///
    /// `message.client_reference` carries the idempotency key.
    async fn send_template_message(
        &self,
        phone_number: &str,
        message: &TemplateMessage,
    ) -> Result<ExternalMessageId, MessagingApiError>;
}

/// Builds clients from account credentials.
pub trait MessagingClientFactory: Send + Sync {
    fn client_for(
        &self,
        credentials: &AccountCredentials,
    ) -> Result<Arc<dyn MessagingApiClient>, MessagingApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn MessagingApiClient, _: &dyn MessagingClientFactory) {}

    #[test]
    fn transient_classification() {
        assert!(MessagingApiError::Transport("reset".into()).is_transient());
        assert!(MessagingApiError::RateLimited { retry_after_secs: None }.is_transient());
        assert!(MessagingApiError::Server {
            status: 502,
            message: "bad gateway".into()
        }
        .is_transient());

        assert!(!MessagingApiError::Validation {
            status: 400,
            message: "bad number".into()
        }
        .is_transient());
        assert!(!MessagingApiError::Unauthorized("expired".into()).is_transient());
        assert!(!MessagingApiError::InvalidCredentials("empty".into()).is_transient());
    }

    #[test]
    fn only_throttling_carries_retry_after() {
        assert_eq!(
            MessagingApiError::RateLimited { retry_after_secs: Some(30) }.retry_after(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(MessagingApiError::RateLimited { retry_after_secs: None }.retry_after(), None);
        assert_eq!(MessagingApiError::Transport("reset".into()).retry_after(), None);
    }
}
