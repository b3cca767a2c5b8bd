//! CampaignScanner - reconciles running campaigns with live workers.
//!
//! Each tick diffs the desired set (campaigns the store says are Running)
//! against the actual set (registry entries), starting workers for the
//! missing and stopping the extras. The store stays the only source of
//! truth; the scanner holds no state beyond the registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::domain::campaign::{AccountCredentials, Campaign, CampaignStatus};
use crate::domain::events::{CampaignStatusChanged, DomainEvent};
use crate::domain::foundation::{CampaignId, Timestamp};
use crate::ports::{CampaignStore, EventPublisher, MessagingClientFactory, RateLimiterFactory};

use super::registry::ActiveCampaignRegistry;
use super::sender::MessageSender;
use super::worker::{cancelled, CampaignRun, CampaignWorker, WorkerState, WorkerSummary};

/// Scanner timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    pub scan_interval: Duration,
    /// How long a stopped worker gets to finish its page before it is aborted.
    pub stop_grace: Duration,
    /// Failed or crashed worker runs in a row after which the campaign
    /// itself is marked Failed instead of restarted.
    pub max_consecutive_failures: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(5),
            stop_grace: Duration::from_secs(10),
            max_consecutive_failures: 3,
        }
    }
}

/// What one tick changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub started: usize,
    pub stopped: usize,
    /// Campaigns marked Failed because they could not be started or kept
    /// failing.
    pub failed: usize,
    /// Finished or crashed workers removed from the registry.
    pub reaped: usize,
}

impl ScanReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

pub struct CampaignScanner {
    store: Arc<dyn CampaignStore>,
    registry: Arc<ActiveCampaignRegistry>,
    client_factory: Arc<dyn MessagingClientFactory>,
    limiter_factory: Arc<dyn RateLimiterFactory>,
    publisher: Arc<dyn EventPublisher>,
    worker: CampaignWorker,
    config: ScannerConfig,
    /// Consecutive failed runs per campaign, reset by any other exit.
    failure_streaks: Mutex<HashMap<CampaignId, u32>>,
}

impl CampaignScanner {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        registry: Arc<ActiveCampaignRegistry>,
        client_factory: Arc<dyn MessagingClientFactory>,
        limiter_factory: Arc<dyn RateLimiterFactory>,
        publisher: Arc<dyn EventPublisher>,
        worker: CampaignWorker,
        config: ScannerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            client_factory,
            limiter_factory,
            publisher,
            worker,
            config,
            failure_streaks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ActiveCampaignRegistry> {
        &self.registry
    }

    /// Ticks every `scan_interval` until shutdown, then stops every worker.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = self.config.scan_interval.as_millis() as u64,
            "Campaign scanner started"
        );

        loop {
            tokio::select! {
                _ = cancelled(&mut shutdown) => break,
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if !report.is_idle() {
                        tracing::info!(
                            started = report.started,
                            stopped = report.stopped,
                            failed = report.failed,
                            reaped = report.reaped,
                            "Scan tick reconciled workers"
                        );
                    }
                }
            }
        }

        let stopped = self.registry.stop_all(self.config.stop_grace).await;
        tracing::info!(workers = stopped.len(), "Campaign scanner stopped");
    }

    /// One reconciliation pass.
    pub async fn tick(&self) -> ScanReport {
        let reaped = self.registry.reap_finished().await;
        self.record_exits(&reaped);
        let mut report = ScanReport {
            reaped: reaped.len(),
            ..ScanReport::default()
        };

        let running = match self.store.list_running_campaigns().await {
            Ok(running) => running,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list running campaigns, skipping reconciliation");
                return report;
            }
        };

        let desired: HashSet<CampaignId> = running.iter().map(|(c, _)| c.id).collect();

        self.streaks().retain(|id, _| desired.contains(id));

        for (campaign, credentials) in running {
            if self.registry.contains(&campaign.id).await {
                continue;
            }
            if let Some(failures) = self.exhausted(&campaign.id) {
                let reason = format!("worker failed {} consecutive runs", failures);
                self.fail_campaign(&campaign, &reason).await;
                self.streaks().remove(&campaign.id);
                report.failed += 1;
                continue;
            }
            if !self.registry.try_register(campaign.id).await {
                continue;
            }
            match self.start(campaign, credentials).await {
                Ok(true) => report.started += 1,
                Ok(false) => {}
                Err(()) => report.failed += 1,
            }
        }

        let extras: Vec<CampaignId> = self
            .registry
            .snapshot()
            .await
            .difference(&desired)
            .copied()
            .collect();
        let grace = self.config.stop_grace;
        let outcomes = join_all(extras.iter().map(|id| self.registry.stop(*id, grace))).await;
        report.stopped = outcomes.iter().filter(|o| o.is_stop()).count();

        let active = self.registry.len().await;
        tracing::debug!(desired = desired.len(), active, "Scan tick complete");
        report
    }

    /// Spawns a worker for a reserved campaign.
    ///
    /// `Ok(false)` means the reservation was released by a concurrent stop
    /// before the worker could attach. `Err` means the campaign cannot send
    /// and was marked failed.
    async fn start(
        &self,
        campaign: Campaign,
        credentials: Option<AccountCredentials>,
    ) -> Result<bool, ()> {
        let Some(credentials) = credentials else {
            self.fail_campaign(&campaign, "campaign has no messaging account")
                .await;
            return Err(());
        };

        let client = match self.client_factory.client_for(&credentials) {
            Ok(client) => client,
            Err(e) => {
                self.fail_campaign(&campaign, &e.to_string()).await;
                return Err(());
            }
        };

        let campaign_id = campaign.id;
        let limiter = self.limiter_factory.limiter_for(campaign.rate_limit);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let run = CampaignRun {
            campaign,
            sender: MessageSender::new(client),
            limiter,
            cancel: cancel_rx,
        };

        let worker = self.worker.clone();
        let handle = tokio::spawn(async move { worker.run(run).await });
        Ok(self.registry.attach(campaign_id, cancel_tx, handle).await)
    }

    fn streaks(&self) -> MutexGuard<'_, HashMap<CampaignId, u32>> {
        self.failure_streaks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_exits(&self, reaped: &[(CampaignId, Option<WorkerSummary>)]) {
        let mut streaks = self.streaks();
        for (campaign_id, summary) in reaped {
            let failed = summary
                .as_ref()
                .map_or(true, |s| s.exit_state == WorkerState::Failed);
            if failed {
                let streak = streaks.entry(*campaign_id).or_insert(0);
                *streak += 1;
                tracing::warn!(
                    campaign_id = %campaign_id,
                    consecutive_failures = *streak,
                    "Campaign worker exited with failure"
                );
            } else {
                streaks.remove(campaign_id);
            }
        }
    }

    /// Streak length if the campaign has reached the failure bound.
    fn exhausted(&self, campaign_id: &CampaignId) -> Option<u32> {
        self.streaks()
            .get(campaign_id)
            .copied()
            .filter(|n| *n >= self.config.max_consecutive_failures)
    }

    async fn fail_campaign(&self, campaign: &Campaign, reason: &str) {
        tracing::error!(
            campaign_id = %campaign.id,
            %reason,
            "Cannot start campaign, marking it failed"
        );

        if let Err(e) = self
            .store
            .update_campaign_status(&campaign.id, CampaignStatus::Failed)
            .await
        {
            tracing::warn!(campaign_id = %campaign.id, error = %e, "Failed to mark campaign failed");
        }

        let event = DomainEvent::CampaignStatusChanged(CampaignStatusChanged {
            campaign_id: campaign.id,
            organization_id: campaign.organization_id,
            status: CampaignStatus::Failed,
            reason: Some(reason.to_string()),
            occurred_at: Timestamp::now(),
        });
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(campaign_id = %campaign.id, error = %e, "Failed to publish campaign failure");
        }

        self.registry.unregister(&campaign.id).await;
    }
}
