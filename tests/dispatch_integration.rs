//! Integration tests for the campaign dispatch engine.
//!
//! These tests drive the scanner tick by tick against the in-memory store
//! and a scripted messaging client:
//! 1. The scanner discovers running campaigns and spawns one worker each
//! 2. Workers page through contacts, send, and persist the cursor per page
//! 3. Status changes in the store start, stop, or fail workers on the next tick
//!
//! No database or messaging API is needed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use campaign_relay::adapters::events::{BusEventPublisher, InMemoryEventPublisher, InMemoryPubSub};
use campaign_relay::adapters::messaging::{MockMessagingClient, MockMessagingClientFactory};
use campaign_relay::adapters::rate_limiter::TokenBucketFactory;
use campaign_relay::adapters::storage::InMemoryCampaignStore;
use campaign_relay::adapters::websocket::{ConnectionRegistry, WebSocketHub};
use campaign_relay::application::dispatch::{
    ActiveCampaignRegistry, CampaignScanner, CampaignWorker, ScannerConfig, WorkerConfig,
};
use campaign_relay::domain::campaign::{
    AccountCredentials, Campaign, CampaignStatus, Contact, RateLimit, TemplateRef,
};
use campaign_relay::domain::events::{DeliveryStatus, DomainEvent};
use campaign_relay::domain::foundation::{
    AuthenticatedUser, ContactId, ExponentialBackoff, OrganizationId, UserId,
};
use campaign_relay::ports::{EventPublisher, MessagingApiError, EVENTS_CHANNEL};

// =============================================================================
// Test Infrastructure
// =============================================================================

const MAX_ATTEMPTS: u32 = 3;

fn worker_config(batch_size: u32) -> WorkerConfig {
    WorkerConfig::default()
        .with_batch_size(batch_size)
        .with_max_attempts(MAX_ATTEMPTS)
        .with_retry_backoff(ExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(5),
        ))
}

fn scanner(
    store: &InMemoryCampaignStore,
    registry: Arc<ActiveCampaignRegistry>,
    client: MockMessagingClient,
    publisher: Arc<dyn EventPublisher>,
    batch_size: u32,
) -> CampaignScanner {
    let worker = CampaignWorker::new(Arc::new(store.clone()), publisher.clone(), worker_config(batch_size));
    CampaignScanner::new(
        Arc::new(store.clone()),
        registry,
        Arc::new(MockMessagingClientFactory::new(client)),
        Arc::new(TokenBucketFactory::default()),
        publisher,
        worker,
        ScannerConfig {
            scan_interval: Duration::from_millis(10),
            stop_grace: Duration::from_secs(1),
            ..ScannerConfig::default()
        },
    )
}

fn phone(id: i64) -> String {
    format!("+1555{:04}", id)
}

async fn seed(store: &InMemoryCampaignStore, org: OrganizationId, contacts: i64) -> Campaign {
    let campaign = Campaign::new(org, "launch", TemplateRef::new("launch", "en"), vec![1])
        .with_rate_limit(RateLimit::per_second(1000));
    store
        .insert_campaign(
            campaign.clone(),
            Some(AccountCredentials::new("acct-1", "1055", "secret-token")),
        )
        .await;
    store
        .add_contacts(1, (1..=contacts).map(|id| Contact::new(id, phone(id))))
        .await;
    campaign
}

/// Ticks until the campaign leaves Running and its worker is reaped.
async fn tick_until_settled(scanner: &CampaignScanner, store: &InMemoryCampaignStore, campaign: &Campaign) {
    for _ in 0..400 {
        scanner.tick().await;
        let settled = store.status(&campaign.id).await != Some(CampaignStatus::Running);
        if settled && !scanner.registry().contains(&campaign.id).await {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("campaign never settled");
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn campaign_completes_with_one_outcome_per_contact() {
    let store = InMemoryCampaignStore::new();
    let publisher = Arc::new(InMemoryEventPublisher::new());
    let client = MockMessagingClient::new();
    let scanner = scanner(&store, Arc::new(ActiveCampaignRegistry::new()), client.clone(), publisher.clone(), 3);
    let campaign = seed(&store, OrganizationId::new(), 10).await;

    tick_until_settled(&scanner, &store, &campaign).await;

    assert_eq!(store.status(&campaign.id).await, Some(CampaignStatus::Completed));
    assert_eq!(store.cursor(&campaign.id).await, Some(ContactId::new(10)));
    let history: Vec<i64> = store
        .cursor_history(&campaign.id)
        .await
        .iter()
        .map(|c| c.value())
        .collect();
    assert_eq!(history, vec![3, 6, 9, 10]);
    for id in 1..=10 {
        assert_eq!(publisher.outcomes_for(&campaign.id, ContactId::new(id)), 1, "contact {}", id);
        assert_eq!(client.calls_to(&phone(id)), 1);
    }
    assert!(publisher.has_event("campaign_status_changed"));

    // A completed campaign is never picked up again.
    assert!(scanner.tick().await.is_idle());
}

#[tokio::test]
async fn restarted_engine_resumes_after_persisted_cursor() {
    let store = InMemoryCampaignStore::new();
    let publisher = Arc::new(InMemoryEventPublisher::new());
    let slow = MockMessagingClient::new().with_delay(Duration::from_millis(15));
    let first = scanner(&store, Arc::new(ActiveCampaignRegistry::new()), slow.clone(), publisher.clone(), 2);
    let campaign = seed(&store, OrganizationId::new(), 12).await;

    first.tick().await;
    for _ in 0..200 {
        if store.cursor(&campaign.id).await >= Some(ContactId::new(4)) {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    // A zero grace period aborts the worker mid-page, like a crash.
    first.registry().stop_all(Duration::ZERO).await;
    let crashed_at = store.cursor(&campaign.id).await.expect("cursor persisted");

    let fresh = MockMessagingClient::new();
    let second = scanner(&store, Arc::new(ActiveCampaignRegistry::new()), fresh.clone(), publisher.clone(), 2);
    tick_until_settled(&second, &store, &campaign).await;

    assert_eq!(store.status(&campaign.id).await, Some(CampaignStatus::Completed));
    for id in 1..=crashed_at.value() {
        assert_eq!(fresh.calls_to(&phone(id)), 0, "contact {} resent", id);
        assert_eq!(slow.calls_to(&phone(id)), 1);
    }
    for id in (crashed_at.value() + 1)..=12 {
        assert_eq!(fresh.calls_to(&phone(id)), 1, "contact {} not sent after restart", id);
    }
}

#[tokio::test]
async fn paused_campaign_stops_advancing() {
    let store = InMemoryCampaignStore::new();
    let publisher = Arc::new(InMemoryEventPublisher::new());
    let client = MockMessagingClient::new().with_delay(Duration::from_millis(10));
    let scanner = scanner(&store, Arc::new(ActiveCampaignRegistry::new()), client.clone(), publisher, 2);
    let campaign = seed(&store, OrganizationId::new(), 40).await;

    scanner.tick().await;
    sleep(Duration::from_millis(30)).await;
    store.set_status(&campaign.id, CampaignStatus::Paused).await;
    let report = scanner.tick().await;

    assert_eq!(report.stopped, 1);
    let cursor = store.cursor(&campaign.id).await;
    let calls = client.call_count();
    sleep(Duration::from_millis(60)).await;
    scanner.tick().await;

    assert_eq!(store.cursor(&campaign.id).await, cursor);
    assert_eq!(client.call_count(), calls);
    assert_eq!(store.status(&campaign.id).await, Some(CampaignStatus::Paused));

    // Resuming continues after the cursor.
    store.set_status(&campaign.id, CampaignStatus::Running).await;
    tick_until_settled(&scanner, &store, &campaign).await;
    assert_eq!(store.status(&campaign.id).await, Some(CampaignStatus::Completed));
    for id in 1..=40 {
        assert!(client.calls_to(&phone(id)) <= 2, "contact {}", id);
        assert!(client.calls_to(&phone(id)) >= 1, "contact {}", id);
    }
}

#[tokio::test]
async fn exhausted_retries_emit_exactly_one_failure() {
    let store = InMemoryCampaignStore::new();
    let publisher = Arc::new(InMemoryEventPublisher::new());
    let client = MockMessagingClient::new().fail_times(
        phone(2),
        MAX_ATTEMPTS as usize,
        MessagingApiError::RateLimited { retry_after_secs: None },
    );
    let scanner = scanner(&store, Arc::new(ActiveCampaignRegistry::new()), client.clone(), publisher.clone(), 5);
    let campaign = seed(&store, OrganizationId::new(), 4).await;

    tick_until_settled(&scanner, &store, &campaign).await;

    assert_eq!(client.calls_to(&phone(2)), MAX_ATTEMPTS as usize);
    let failures: Vec<_> = publisher
        .published_events()
        .into_iter()
        .filter_map(|e| match e {
            DomainEvent::NewMessage(m) if m.status == DeliveryStatus::Failed => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].contact_id, ContactId::new(2));
    assert_eq!(failures[0].attempts, MAX_ATTEMPTS);
    assert_eq!(store.status(&campaign.id).await, Some(CampaignStatus::Completed));
}

#[tokio::test]
async fn concurrent_scanners_start_one_worker() {
    let store = InMemoryCampaignStore::new();
    let publisher = Arc::new(InMemoryEventPublisher::new());
    let registry = Arc::new(ActiveCampaignRegistry::new());
    let client = MockMessagingClient::new().with_delay(Duration::from_millis(5));
    let a = scanner(&store, registry.clone(), client.clone(), publisher.clone(), 4);
    let b = scanner(&store, registry.clone(), client.clone(), publisher.clone(), 4);
    let campaign = seed(&store, OrganizationId::new(), 8).await;

    let (ra, rb) = tokio::join!(a.tick(), b.tick());
    assert_eq!(ra.started + rb.started, 1);

    tick_until_settled(&a, &store, &campaign).await;
    for id in 1..=8 {
        assert_eq!(client.calls_to(&phone(id)), 1);
    }
}

#[tokio::test]
async fn campaign_without_account_is_failed() {
    let store = InMemoryCampaignStore::new();
    let publisher = Arc::new(InMemoryEventPublisher::new());
    let scanner = scanner(&store, Arc::new(ActiveCampaignRegistry::new()), MockMessagingClient::new(), publisher.clone(), 5);
    let campaign = Campaign::new(OrganizationId::new(), "orphan", TemplateRef::new("t", "en"), vec![1]);
    store.insert_campaign(campaign.clone(), None).await;

    let report = scanner.tick().await;

    assert_eq!(report.failed, 1);
    assert_eq!(store.status(&campaign.id).await, Some(CampaignStatus::Failed));
    let reasons: Vec<_> = publisher
        .published_events()
        .into_iter()
        .filter_map(|e| match e {
            DomainEvent::CampaignStatusChanged(c) => c.reason,
            _ => None,
        })
        .collect();
    assert_eq!(reasons.len(), 1);
    assert!(scanner.tick().await.is_idle());
}

#[tokio::test]
async fn delivery_outcomes_reach_organization_connections_over_the_bus() {
    let bus = Arc::new(InMemoryPubSub::new());
    let connections = Arc::new(ConnectionRegistry::new(64));
    let hub = WebSocketHub::new(bus.clone(), connections.clone());
    let (shutdown, rx) = watch::channel(false);
    let hub_task = tokio::spawn(async move { hub.run(rx).await });
    for _ in 0..200 {
        if bus.subscriber_count(EVENTS_CHANNEL) > 0 {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }

    let org = OrganizationId::new();
    let mut member = connections.register(AuthenticatedUser::new(UserId::new(), org)).await;
    connections.mark_open(member.id).await;
    let mut outsider = connections
        .register(AuthenticatedUser::new(UserId::new(), OrganizationId::new()))
        .await;
    connections.mark_open(outsider.id).await;

    let store = InMemoryCampaignStore::new();
    let publisher = Arc::new(BusEventPublisher::new(bus.clone()));
    let scanner = scanner(&store, Arc::new(ActiveCampaignRegistry::new()), MockMessagingClient::new(), publisher, 2);
    let campaign = seed(&store, org, 3).await;
    tick_until_settled(&scanner, &store, &campaign).await;

    let mut names = Vec::new();
    for _ in 0..4 {
        let envelope = timeout(Duration::from_secs(1), member.queue.recv())
            .await
            .expect("no envelope")
            .expect("queue closed");
        names.push(envelope.event_name);
    }
    assert_eq!(names.iter().filter(|n| *n == "new_message").count(), 3);
    assert_eq!(names.last().map(String::as_str), Some("campaign_status_changed"));
    assert!(outsider.queue.try_recv().is_err());

    shutdown.send(true).unwrap();
    hub_task.await.unwrap();
}
