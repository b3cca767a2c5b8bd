//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `auth` - Token validation at WebSocket upgrade
//! - `events` - Pub/sub transports and event publishers (in-memory, Redis)
//! - `messaging` - Outbound messaging API clients
//! - `postgres` - Relational campaign store
//! - `rate_limiter` - Per-campaign send pacing
//! - `storage` - In-memory campaign store
//! - `websocket` - Connection registry, hub and upgrade handler

pub mod auth;
pub mod events;
pub mod messaging;
pub mod postgres;
pub mod rate_limiter;
pub mod storage;
pub mod websocket;

pub use events::{BusEventPublisher, InMemoryEventPublisher, InMemoryPubSub, RedisPubSub};
pub use storage::InMemoryCampaignStore;
