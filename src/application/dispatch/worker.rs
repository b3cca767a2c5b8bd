//! CampaignWorker - drives one campaign from its cursor to completion.
//!
//! ```text
//! Starting → Fetching → Sending → Advancing ─┬─► Fetching
//!                │                            ├─► Failed   (cursor write failed)
//!                ├─► Completed (empty page)   │
//!                └─► Paused    (cancelled between pages)
//! ```
//!
//! A page's cursor is persisted only after every contact in it reached a
//! terminal outcome, so a restart resumes after the last fully processed
//! page.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;

use crate::domain::campaign::{
    Campaign, CampaignStatus, Contact, DispatchOutcome, DispatchUnit, SendOutcome,
};
use crate::domain::events::{CampaignStatusChanged, DeliveryStatus, DomainEvent, NewMessage};
use crate::domain::foundation::{CampaignId, ContactId, ExponentialBackoff, Timestamp};
use crate::ports::{CampaignStore, EventPublisher, RateLimiter};

use super::fetcher::ContactBatchFetcher;
use super::sender::MessageSender;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Fetching,
    Sending,
    Advancing,
    Completed,
    Paused,
    Failed,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Starting => "starting",
            WorkerState::Fetching => "fetching",
            WorkerState::Sending => "sending",
            WorkerState::Advancing => "advancing",
            WorkerState::Completed => "completed",
            WorkerState::Paused => "paused",
            WorkerState::Failed => "failed",
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            WorkerState::Completed | WorkerState::Paused | WorkerState::Failed
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning shared by every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub batch_size: u32,
    /// Send attempts per contact, and write attempts per cursor update.
    pub max_attempts: u32,
    pub retry_backoff: ExponentialBackoff,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 3,
            retry_backoff: ExponentialBackoff::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Everything a worker needs for one campaign.
pub struct CampaignRun {
    pub campaign: Campaign,
    pub sender: MessageSender,
    pub limiter: Arc<dyn RateLimiter>,
    /// Flipped to true (or dropped) to request a stop between pages.
    pub cancel: watch::Receiver<bool>,
}

/// How a worker run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub campaign_id: CampaignId,
    pub exit_state: WorkerState,
    pub pages: u32,
    pub sent: u32,
    pub failed: u32,
}

impl WorkerSummary {
    fn new(campaign_id: CampaignId) -> Self {
        Self {
            campaign_id,
            exit_state: WorkerState::Starting,
            pages: 0,
            sent: 0,
            failed: 0,
        }
    }
}

/// Runs campaigns. One instance is shared by every spawned worker task.
#[derive(Clone)]
pub struct CampaignWorker {
    store: Arc<dyn CampaignStore>,
    fetcher: ContactBatchFetcher,
    publisher: Arc<dyn EventPublisher>,
    config: WorkerConfig,
}

impl CampaignWorker {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        publisher: Arc<dyn EventPublisher>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            fetcher: ContactBatchFetcher::new(store.clone()),
            store,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn run(&self, run: CampaignRun) -> WorkerSummary {
        let CampaignRun {
            campaign,
            sender,
            limiter,
            mut cancel,
        } = run;
        let campaign_id = campaign.id;
        let mut summary = WorkerSummary::new(campaign_id);
        let mut cursor = campaign.cursor;

        tracing::info!(
            campaign_id = %campaign_id,
            cursor = ?cursor.map(|c| c.value()),
            "Campaign worker started"
        );

        loop {
            if is_cancelled(&cancel) {
                return self.exit(summary, WorkerState::Paused);
            }

            self.enter(&mut summary, WorkerState::Fetching);
            let Some(page) = self.fetch_page(&campaign_id, cursor, &mut cancel).await else {
                return self.exit(summary, WorkerState::Paused);
            };

            let Some(last) = page.last().map(|c| c.id) else {
                let state = self.complete(&campaign).await;
                return self.exit(summary, state);
            };

            self.enter(&mut summary, WorkerState::Sending);
            for outcome in self.send_page(&campaign, page, &sender, &limiter).await {
                if outcome.is_sent() {
                    summary.sent += 1;
                } else {
                    summary.failed += 1;
                }
            }
            summary.pages += 1;

            self.enter(&mut summary, WorkerState::Advancing);
            if cursor.map_or(true, |current| last > current) {
                if !self.persist_cursor(&campaign_id, last).await {
                    return self.exit(summary, WorkerState::Failed);
                }
                cursor = Some(last);
            }
        }
    }

    fn enter(&self, summary: &mut WorkerSummary, next: WorkerState) {
        tracing::debug!(
            campaign_id = %summary.campaign_id,
            from = %summary.exit_state,
            to = %next,
            "Worker state transition"
        );
        summary.exit_state = next;
    }

    fn exit(&self, mut summary: WorkerSummary, state: WorkerState) -> WorkerSummary {
        self.enter(&mut summary, state);
        tracing::info!(
            campaign_id = %summary.campaign_id,
            state = %state,
            pages = summary.pages,
            sent = summary.sent,
            failed = summary.failed,
            "Campaign worker stopped"
        );
        summary
    }

    /// Retries until a page arrives. Returns `None` if cancelled while
    /// backing off.
    async fn fetch_page(
        &self,
        campaign_id: &CampaignId,
        cursor: Option<ContactId>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Option<Vec<Contact>> {
        let mut attempt: u32 = 0;
        loop {
            match self
                .fetcher
                .fetch_next_batch(campaign_id, cursor, self.config.batch_size)
                .await
            {
                Ok(page) => return Some(page),
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.config.retry_backoff.delay_for(attempt);
                    tracing::warn!(
                        campaign_id = %campaign_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Contact fetch failed, backing off"
                    );
                    tokio::select! {
                        _ = cancelled(cancel) => return None,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Sends every contact of a page concurrently and waits for all of them.
    async fn send_page(
        &self,
        campaign: &Campaign,
        page: Vec<Contact>,
        sender: &MessageSender,
        limiter: &Arc<dyn RateLimiter>,
    ) -> Vec<DispatchOutcome> {
        let mut tasks = JoinSet::new();
        let size = page.len();

        for contact in page {
            let unit = DispatchUnit::render(campaign, contact);
            let sender = sender.clone();
            let limiter = limiter.clone();
            let publisher = self.publisher.clone();
            let config = self.config;

            tasks.spawn(async move {
                let outcome = deliver(unit.clone(), &sender, limiter.as_ref(), &config).await;
                publish_outcome(publisher.as_ref(), &unit, &outcome).await;
                outcome
            });
        }

        let mut outcomes = Vec::with_capacity(size);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(campaign_id = %campaign.id, error = %e, "Send task panicked");
                }
            }
        }
        outcomes
    }

    async fn persist_cursor(&self, campaign_id: &CampaignId, cursor: ContactId) -> bool {
        for attempt in 1..=self.config.max_attempts {
            match self.store.update_campaign_cursor(campaign_id, cursor).await {
                Ok(()) => return true,
                Err(e) if attempt < self.config.max_attempts => {
                    let delay = self.config.retry_backoff.delay_for(attempt);
                    tracing::warn!(
                        campaign_id = %campaign_id,
                        cursor = cursor.value(),
                        attempt,
                        error = %e,
                        "Cursor write failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        campaign_id = %campaign_id,
                        cursor = cursor.value(),
                        error = %e,
                        "Cursor write failed, stopping worker"
                    );
                }
            }
        }
        false
    }

    async fn complete(&self, campaign: &Campaign) -> WorkerState {
        if let Err(e) = self
            .store
            .update_campaign_status(&campaign.id, CampaignStatus::Completed)
            .await
        {
            tracing::error!(campaign_id = %campaign.id, error = %e, "Failed to mark campaign completed");
            return WorkerState::Failed;
        }

        let event = DomainEvent::CampaignStatusChanged(CampaignStatusChanged {
            campaign_id: campaign.id,
            organization_id: campaign.organization_id,
            status: CampaignStatus::Completed,
            reason: None,
            occurred_at: Timestamp::now(),
        });
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(campaign_id = %campaign.id, error = %e, "Failed to publish completion");
        }
        WorkerState::Completed
    }
}

/// Sends one unit, retrying transient failures up to `max_attempts`.
async fn deliver(
    mut unit: DispatchUnit,
    sender: &MessageSender,
    limiter: &dyn RateLimiter,
    config: &WorkerConfig,
) -> DispatchOutcome {
    loop {
        limiter.acquire().await;
        unit.attempt += 1;

        match sender.send(&unit).await {
            SendOutcome::Sent(external_id) => {
                return DispatchOutcome::Sent {
                    contact_id: unit.contact_id(),
                    external_id,
                    attempts: unit.attempt,
                }
            }
            SendOutcome::PermanentFailure(reason) => {
                return DispatchOutcome::Failed {
                    contact_id: unit.contact_id(),
                    reason,
                    attempts: unit.attempt,
                }
            }
            SendOutcome::TransientFailure { reason, .. } if unit.attempt >= config.max_attempts => {
                return DispatchOutcome::Failed {
                    contact_id: unit.contact_id(),
                    reason,
                    attempts: unit.attempt,
                }
            }
            SendOutcome::TransientFailure {
                reason,
                retry_after,
            } => {
                let backoff = config.retry_backoff.delay_for(unit.attempt);
                let delay = retry_after.map_or(backoff, |requested| requested.max(backoff));
                tracing::debug!(
                    campaign_id = %unit.campaign_id,
                    contact_id = %unit.contact_id(),
                    attempt = unit.attempt,
                    delay_ms = delay.as_millis() as u64,
                    %reason,
                    "Transient send failure, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

async fn publish_outcome(publisher: &dyn EventPublisher, unit: &DispatchUnit, outcome: &DispatchOutcome) {
    let (status, external_message_id, reason, attempts) = match outcome {
        DispatchOutcome::Sent {
            external_id,
            attempts,
            ..
        } => (DeliveryStatus::Sent, Some(external_id.clone()), None, *attempts),
        DispatchOutcome::Failed {
            reason, attempts, ..
        } => (DeliveryStatus::Failed, None, Some(reason.clone()), *attempts),
    };

    let event = DomainEvent::NewMessage(NewMessage {
        campaign_id: unit.campaign_id,
        organization_id: unit.organization_id,
        contact_id: unit.contact_id(),
        status,
        external_message_id,
        reason,
        attempts,
        occurred_at: Timestamp::now(),
    });

    if let Err(e) = publisher.publish(&event).await {
        tracing::warn!(
            campaign_id = %unit.campaign_id,
            contact_id = %unit.contact_id(),
            error = %e,
            "Failed to publish delivery outcome"
        );
    }
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}

/// Resolves once cancellation is requested or the sender is dropped.
pub(super) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}
