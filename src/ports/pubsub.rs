//! PubSub port - the bus between producers and the real-time hub.
//!
//! The bus is a pure transport. Messages published while nobody is
//! subscribed are lost, and subscribers may miss messages across a
//! reconnect.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::foundation::DomainError;

/// Channel every producer publishes domain events on.
pub const EVENTS_CHANNEL: &str = "campaign-relay:events";

/// Port for a publish/subscribe service.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Publish raw bytes on a channel.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), DomainError>;

    /// Subscribe to a channel.
    ///
    /// The stream ends when the underlying subscription is lost; callers
    /// resubscribe.
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn PubSub) {}

    #[test]
    fn events_channel_is_namespaced() {
        assert!(EVENTS_CHANNEL.starts_with("campaign-relay:"));
    }
}
