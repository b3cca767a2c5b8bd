//! PostgreSQL adapters - Database implementations for store ports.
//!
//! - `PostgresCampaignStore` - Running campaigns, contact pages, progress

mod campaign_store;

pub use campaign_store::PostgresCampaignStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode};

/// Builds the shared pool. Connections are established lazily and the
/// pool replaces broken ones on its own.
pub fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_lazy(&config.url)
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to configure database pool: {}", e),
            )
        })
}
