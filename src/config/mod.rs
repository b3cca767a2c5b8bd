//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `CAMPAIGN_RELAY` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use campaign_relay::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod auth;
mod database;
mod dispatch;
mod error;
mod messaging;
mod realtime;
mod redis;
mod server;

pub use auth::AuthConfig;
pub use database::DatabaseConfig;
pub use dispatch::DispatchConfig;
pub use error::{ConfigError, ValidationError};
pub use messaging::MessagingConfig;
pub use realtime::RealtimeConfig;
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Redis configuration (event bus)
    pub redis: RedisConfig,

    /// WebSocket token verification
    pub auth: AuthConfig,

    /// Outbound messaging API
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Scanner and worker tuning
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// WebSocket connection tuning
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `CAMPAIGN_RELAY` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `CAMPAIGN_RELAY__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `CAMPAIGN_RELAY__DISPATCH__BATCH_SIZE=100` -> `dispatch.batch_size = 100`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CAMPAIGN_RELAY")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.redis.validate()?;
        self.auth.validate(&self.server.environment)?;
        self.messaging.validate(&self.server.environment)?;
        self.dispatch.validate()?;
        self.realtime.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
