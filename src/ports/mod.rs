//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the application layer and the outside world. Adapters implement these
//! ports.
//!
//! ## Dispatch Ports
//!
//! - `CampaignStore` - Running campaigns, contact pages, progress writes
//! - `MessagingApiClient` / `MessagingClientFactory` - Outbound messaging API
//! - `RateLimiter` / `RateLimiterFactory` - Per-campaign send pacing
//!
//! ## Event Ports
//!
//! - `EventPublisher` - Publishes typed domain events
//! - `PubSub` - Raw publish/subscribe transport
//!
//! ## Real-time Ports
//!
//! - `SessionValidator` - Bearer-token validation at WebSocket upgrade

mod campaign_store;
mod event_publisher;
mod messaging_client;
mod pubsub;
mod rate_limiter;
mod session_validator;

pub use campaign_store::CampaignStore;
pub use event_publisher::EventPublisher;
pub use messaging_client::{MessagingApiClient, MessagingApiError, MessagingClientFactory};
pub use pubsub::{PubSub, EVENTS_CHANNEL};
pub use rate_limiter::{RateLimiter, RateLimiterFactory};
pub use session_validator::SessionValidator;
