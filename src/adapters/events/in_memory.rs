//! In-memory pub/sub and event publisher for tests and single-process runs.
//!
//! `InMemoryPubSub` fans payloads out through one tokio broadcast channel
//! per channel name and keeps a bounded copy of the most recent payloads.
//! `InMemoryEventPublisher` records typed events without serializing them
//! and is meant for tests only: its record is never trimmed.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

use crate::domain::events::DomainEvent;
use crate::domain::foundation::{CampaignId, ContactId, DomainError, ErrorCode};
use crate::ports::{EventPublisher, PubSub};

const DEFAULT_CAPACITY: usize = 1024;
const DEFAULT_RECORD_LIMIT: usize = 1024;

// ════════════════════════════════════════════════════════════════════════════
// InMemoryPubSub
// ════════════════════════════════════════════════════════════════════════════

/// Process-local publish/subscribe bus.
///
/// Like the real bus, publishing with no subscribers drops the payload
/// (it is still recorded for assertions). Only the last `record_limit`
/// payloads are kept.
pub struct InMemoryPubSub {
    channels: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    published: RwLock<VecDeque<(String, Vec<u8>)>>,
    capacity: usize,
    record_limit: usize,
    fail_publish: RwLock<bool>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            published: RwLock::new(VecDeque::new()),
            capacity,
            record_limit: DEFAULT_RECORD_LIMIT,
            fail_publish: RwLock::new(false),
        }
    }

    /// How many recent payloads to keep. Zero disables recording.
    pub fn with_record_limit(mut self, limit: usize) -> Self {
        self.record_limit = limit;
        self
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        if let Some(tx) = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
        {
            return tx.clone();
        }
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    // === Test Helpers ===

    /// Recorded payloads published on a channel, in order.
    pub fn published_on(&self, channel: &str) -> Vec<Vec<u8>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Number of live subscriptions on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Ends every open subscription, as a lost connection would.
    pub fn disconnect_all(&self) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Makes subsequent publishes fail.
    pub fn set_fail_publish(&self, fail: bool) {
        *self.fail_publish.write().unwrap_or_else(PoisonError::into_inner) = fail;
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), DomainError> {
        if *self.fail_publish.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(DomainError::new(ErrorCode::PubSubError, "publish disabled"));
        }
        if self.record_limit > 0 {
            let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
            if published.len() == self.record_limit {
                published.pop_front();
            }
            published.push_back((channel.to_string(), payload.clone()));
        }

        // No subscribers: payload is dropped.
        let _ = self.sender(channel).send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, Vec<u8>>, DomainError> {
        let rx = self.sender(channel).subscribe();
        let stream = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "In-memory subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// InMemoryEventPublisher
// ════════════════════════════════════════════════════════════════════════════

/// Event publisher that records every event for assertions. Test use only.
#[derive(Default)]
pub struct InMemoryEventPublisher {
    published: RwLock<Vec<DomainEvent>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    pub fn published_events(&self) -> Vec<DomainEvent> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Checks if an event with the given wire tag was published.
    pub fn has_event(&self, event_type: &str) -> bool {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.event_type() == event_type)
    }

    /// `NewMessage` events for one contact of one campaign.
    pub fn outcomes_for(&self, campaign_id: &CampaignId, contact_id: ContactId) -> usize {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| match e {
                DomainEvent::NewMessage(m) => {
                    m.campaign_id == *campaign_id && m.contact_id == contact_id
                }
                _ => false,
            })
            .count()
    }

    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), DomainError> {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
