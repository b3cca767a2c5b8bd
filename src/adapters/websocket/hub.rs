//! Bus consumer that fans domain events out to WebSocket connections.
//!
//! ```text
//!   PubSub channel ──► WebSocketHub ──► ConnectionRegistry
//!                       decode            targets(route)
//!                       route             try_send ──► per-connection queue ──► writer task
//! ```
//!
//! The hub never writes to a socket. It only enqueues, so one slow client
//! cannot stall delivery to the others.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc::error::TrySendError, watch};
use tokio::time::sleep;

use crate::domain::events::DomainEvent;
use crate::domain::foundation::ExponentialBackoff;
use crate::ports::{PubSub, EVENTS_CHANNEL};

use super::connections::ConnectionRegistry;
use super::messages::Envelope;

/// What happened to one bus payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Malformed payload or unknown tag.
    pub skipped: bool,
    pub delivered: usize,
    /// Queue full; the event was dropped for that connection.
    pub dropped: usize,
    /// Queue closed; the connection was deregistered.
    pub disconnected: usize,
}

impl DeliveryReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Single consumption loop over the events channel.
pub struct WebSocketHub {
    pubsub: Arc<dyn PubSub>,
    registry: Arc<ConnectionRegistry>,
    channel: String,
    backoff: ExponentialBackoff,
}

impl WebSocketHub {
    pub fn new(pubsub: Arc<dyn PubSub>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            pubsub,
            registry,
            channel: EVENTS_CHANNEL.to_string(),
            backoff: ExponentialBackoff::default(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Delay schedule between resubscription attempts.
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Consumes the channel until `shutdown` flips to true.
    ///
    /// A failed or ended subscription is retried with backoff; it never
    /// ends the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            match self.pubsub.subscribe(&self.channel).await {
                Ok(mut stream) => {
                    failures = 0;
                    tracing::info!(channel = %self.channel, "Hub subscribed to events channel");

                    loop {
                        tokio::select! {
                            _ = wait_for_shutdown(&mut shutdown) => {
                                tracing::info!("Hub stopping");
                                return;
                            }
                            next = stream.next() => match next {
                                Some(payload) => {
                                    self.dispatch_payload(&payload).await;
                                }
                                None => {
                                    tracing::warn!(channel = %self.channel, "Events subscription ended");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(channel = %self.channel, error = %e, "Failed to subscribe to events channel");
                }
            }

            failures = failures.saturating_add(1);
            let delay = self.backoff.delay_for(failures);
            tracing::debug!(attempt = failures, delay_ms = delay.as_millis() as u64, "Resubscribing after backoff");

            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => return,
                _ = sleep(delay) => {}
            }
        }
    }

    /// Decodes one payload and routes it.
    pub async fn dispatch_payload(&self, payload: &[u8]) -> DeliveryReport {
        match DomainEvent::from_wire(payload) {
            Ok(Some(event)) => self.deliver(&event).await,
            Ok(None) => {
                tracing::debug!("Skipping event with unknown tag");
                DeliveryReport::skipped()
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = payload.len(), "Skipping malformed bus payload");
                DeliveryReport::skipped()
            }
        }
    }

    /// Enqueues an event on every connection its route addresses.
    pub async fn deliver(&self, event: &DomainEvent) -> DeliveryReport {
        let envelope = match Envelope::from_event(event) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(event_type = event.event_type(), error = %e, "Failed to encode event envelope");
                return DeliveryReport::skipped();
            }
        };

        let route = event.route();
        let mut report = DeliveryReport::default();

        for target in self.registry.targets(&route).await {
            match target.outbound.try_send(envelope.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %target.id,
                        event_type = event.event_type(),
                        "Outbound queue full, dropping event"
                    );
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    if self.registry.deregister(target.id).await {
                        report.disconnected += 1;
                    }
                }
            }
        }

        tracing::debug!(
            event_type = event.event_type(),
            ?route,
            delivered = report.delivered,
            dropped = report.dropped,
            "Routed event"
        );
        report
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryPubSub;
    use crate::domain::events::{ChatAssignment, NewNotification};
    use crate::domain::foundation::{AuthenticatedUser, OrganizationId, Timestamp, UserId};
    use std::time::Duration;
    use uuid::Uuid;

    fn notification() -> DomainEvent {
        DomainEvent::NewNotification(NewNotification {
            notification_id: Uuid::new_v4(),
            title: "hello".to_string(),
            occurred_at: Timestamp::now(),
        })
    }

    fn hub(queue_capacity: usize) -> (WebSocketHub, Arc<InMemoryPubSub>) {
        let pubsub = Arc::new(InMemoryPubSub::new());
        let registry = Arc::new(ConnectionRegistry::new(queue_capacity));
        (WebSocketHub::new(pubsub.clone(), registry), pubsub)
    }

    async fn open(hub: &WebSocketHub, user: AuthenticatedUser) -> super::super::connections::Registration {
        let reg = hub.registry().register(user).await;
        hub.registry().mark_open(reg.id).await;
        reg
    }

    #[tokio::test]
    async fn valid_payload_is_enqueued() {
        let (hub, _) = hub(8);
        let mut reg = open(&hub, AuthenticatedUser::new(UserId::new(), OrganizationId::new())).await;

        let report = hub.dispatch_payload(&notification().to_wire().unwrap()).await;

        assert_eq!(report.delivered, 1);
        let envelope = reg.queue.recv().await.unwrap();
        assert_eq!(envelope.event_name, "new_notification");
    }

    #[tokio::test]
    async fn malformed_and_unknown_payloads_are_skipped() {
        let (hub, _) = hub(8);
        open(&hub, AuthenticatedUser::new(UserId::new(), OrganizationId::new())).await;

        assert!(hub.dispatch_payload(b"{not json").await.skipped);
        assert!(hub.dispatch_payload(br#"{"eventType":"campaign_archived"}"#).await.skipped);
        assert!(hub.dispatch_payload(br#"{"eventType":"chat_assignment"}"#).await.skipped);
    }

    #[tokio::test]
    async fn targeted_event_reaches_only_assignee() {
        let (hub, _) = hub(8);
        let org = OrganizationId::new();
        let alice = AuthenticatedUser::new(UserId::new(), org);
        let mut a = open(&hub, alice.clone()).await;
        let mut b = open(&hub, AuthenticatedUser::new(UserId::new(), org)).await;

        let event = DomainEvent::ChatAssignment(ChatAssignment {
            chat_id: Uuid::new_v4(),
            organization_id: org,
            assignee_id: alice.id,
            assigned_by: None,
            occurred_at: Timestamp::now(),
        });
        let report = hub.deliver(&event).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(a.queue.try_recv().unwrap().event_name, "chat_assignment");
        assert!(b.queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_without_disconnecting() {
        let (hub, _) = hub(1);
        let reg = open(&hub, AuthenticatedUser::new(UserId::new(), OrganizationId::new())).await;

        hub.deliver(&notification()).await;
        let report = hub.deliver(&notification()).await;

        assert_eq!(report.dropped, 1);
        assert_eq!(hub.registry().count().await, 1);
        drop(reg);
    }

    #[tokio::test]
    async fn closed_queue_deregisters_connection() {
        let (hub, _) = hub(8);
        let reg = open(&hub, AuthenticatedUser::new(UserId::new(), OrganizationId::new())).await;
        drop(reg);

        let report = hub.deliver(&notification()).await;

        assert_eq!(report.disconnected, 1);
        assert_eq!(hub.registry().count().await, 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (hub, pubsub) = hub(8);
        let hub = Arc::new(hub);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn({
            let hub = hub.clone();
            async move { hub.run(rx).await }
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            while pubsub.subscriber_count(EVENTS_CHANNEL) == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
