//! EventPublisher port - Interface for publishing domain events.
//!
//! Publishing is best-effort: there is no acknowledgment and nothing in the
//! dispatch engine depends on an event having been delivered.

use async_trait::async_trait;

use crate::domain::events::DomainEvent;
use crate::domain::foundation::DomainError;

/// Port for publishing domain events.
///
/// Implementations serialize the event and push it onto the deployment's
/// events channel. Errors are returned so callers can log them; callers
/// must not treat them as failures of the operation that produced the event.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: &DomainEvent) -> Result<(), DomainError>;

    /// Publish several events in order, stopping at the first failure.
    async fn publish_all(&self, events: &[DomainEvent]) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
