//! EventPublisher that serializes domain events onto a pub/sub channel.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::events::DomainEvent;
use crate::domain::foundation::DomainError;
use crate::ports::{EventPublisher, PubSub, EVENTS_CHANNEL};

/// Publishes `DomainEvent`s as JSON on a single channel.
#[derive(Clone)]
pub struct BusEventPublisher {
    bus: Arc<dyn PubSub>,
    channel: String,
}

impl BusEventPublisher {
    /// Publishes on the default events channel.
    pub fn new(bus: Arc<dyn PubSub>) -> Self {
        Self::with_channel(bus, EVENTS_CHANNEL)
    }

    pub fn with_channel(bus: Arc<dyn PubSub>, channel: impl Into<String>) -> Self {
        Self {
            bus,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl EventPublisher for BusEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), DomainError> {
        let payload = event.to_wire()?;
        self.bus.publish(&self.channel, payload).await?;
        tracing::trace!(
            event_type = event.event_type(),
            channel = %self.channel,
            "Published domain event"
        );
        Ok(())
    }
}
