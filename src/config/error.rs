//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("JWT secret must be at least 32 bytes in production")]
    JwtSecretTooShort,

    #[error("Messaging API base URL must use HTTPS in production")]
    MessagingUrlMustBeHttps,

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("{lower} must not exceed {upper}")]
    InvertedBounds {
        lower: &'static str,
        upper: &'static str,
    },
}
