//! Event bus adapters.
//!
//! - `RedisPubSub` - Production pub/sub transport
//! - `InMemoryPubSub` - Process-local transport for tests
//! - `BusEventPublisher` - Serializes domain events onto a transport
//! - `InMemoryEventPublisher` - Records events for assertions

mod bus_publisher;
mod in_memory;
mod redis_pubsub;

pub use bus_publisher::BusEventPublisher;
pub use in_memory::{InMemoryEventPublisher, InMemoryPubSub};
pub use redis_pubsub::RedisPubSub;
