//! ActiveCampaignRegistry - which campaigns have a live worker.
//!
//! An entry exists from the moment a scanner tick reserves a campaign
//! until its worker has ended and the entry was reaped or stopped. While
//! any entry exists for a campaign, no second worker can be started for
//! it.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::domain::foundation::CampaignId;

use super::worker::WorkerSummary;

#[derive(Debug, Default)]
struct Entry {
    cancel: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<WorkerSummary>>,
    stopping: bool,
}

/// How a stop request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker finished its page and exited.
    Drained(WorkerSummary),
    /// The worker was still running at the grace deadline and was aborted.
    Aborted,
    /// The worker task panicked.
    Crashed,
    /// Reserved but never attached; the reservation was released.
    Released,
    /// No entry, or another stop is already in progress.
    NotFound,
}

impl StopOutcome {
    pub fn is_stop(&self) -> bool {
        !matches!(self, StopOutcome::NotFound)
    }
}

/// Concurrency-safe map of campaign id to worker handle.
#[derive(Debug, Default)]
pub struct ActiveCampaignRegistry {
    entries: RwLock<HashMap<CampaignId, Entry>>,
}

impl ActiveCampaignRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a campaign. Returns false if it already has an entry.
    ///
    /// Check and insert happen under one write lock, so concurrent callers
    /// for the same id see exactly one `true`.
    pub async fn try_register(&self, campaign_id: CampaignId) -> bool {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&campaign_id) {
            return false;
        }
        entries.insert(campaign_id, Entry::default());
        true
    }

    /// Attaches a spawned worker to its reservation.
    ///
    /// If the reservation is gone the worker is cancelled immediately and
    /// false is returned.
    pub async fn attach(
        &self,
        campaign_id: CampaignId,
        cancel: watch::Sender<bool>,
        handle: JoinHandle<WorkerSummary>,
    ) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&campaign_id) {
            Some(entry) if entry.handle.is_none() && !entry.stopping => {
                entry.cancel = Some(cancel);
                entry.handle = Some(handle);
                true
            }
            _ => {
                let _ = cancel.send(true);
                false
            }
        }
    }

    pub async fn unregister(&self, campaign_id: &CampaignId) -> bool {
        self.entries.write().await.remove(campaign_id).is_some()
    }

    pub async fn contains(&self, campaign_id: &CampaignId) -> bool {
        self.entries.read().await.contains_key(campaign_id)
    }

    pub async fn snapshot(&self) -> HashSet<CampaignId> {
        self.entries.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Removes entries whose worker task has already ended, returning
    /// their ids with the worker's summary, or `None` if it panicked.
    pub async fn reap_finished(&self) -> Vec<(CampaignId, Option<WorkerSummary>)> {
        let finished: Vec<(CampaignId, JoinHandle<WorkerSummary>)> = {
            let mut entries = self.entries.write().await;
            let ids: Vec<CampaignId> = entries
                .iter()
                .filter(|(_, e)| !e.stopping && e.handle.as_ref().is_some_and(|h| h.is_finished()))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).and_then(|e| e.handle).map(|h| (id, h)))
                .collect()
        };

        let mut reaped = Vec::with_capacity(finished.len());
        for (campaign_id, handle) in finished {
            let summary = match handle.await {
                Ok(summary) => {
                    tracing::debug!(
                        campaign_id = %campaign_id,
                        exit_state = %summary.exit_state,
                        "Reaped finished worker"
                    );
                    Some(summary)
                }
                Err(e) => {
                    tracing::warn!(campaign_id = %campaign_id, error = %e, "Reaped crashed worker");
                    None
                }
            };
            reaped.push((campaign_id, summary));
        }
        reaped
    }

    /// Signals the worker to stop after its current page and waits up to
    /// `grace` for it. The entry is removed only once the worker has ended
    /// or been aborted.
    pub async fn stop(&self, campaign_id: CampaignId, grace: Duration) -> StopOutcome {
        let handle = {
            let mut entries = self.entries.write().await;
            let Some(entry) = entries.get_mut(&campaign_id) else {
                return StopOutcome::NotFound;
            };
            if entry.stopping {
                return StopOutcome::NotFound;
            }
            match entry.handle.take() {
                Some(handle) => {
                    entry.stopping = true;
                    if let Some(cancel) = &entry.cancel {
                        let _ = cancel.send(true);
                    }
                    handle
                }
                None => {
                    entries.remove(&campaign_id);
                    return StopOutcome::Released;
                }
            }
        };

        let mut handle = handle;
        let outcome = match timeout(grace, &mut handle).await {
            Ok(Ok(summary)) => StopOutcome::Drained(summary),
            Ok(Err(e)) => {
                tracing::warn!(campaign_id = %campaign_id, error = %e, "Worker crashed while stopping");
                StopOutcome::Crashed
            }
            Err(_) => {
                tracing::warn!(
                    campaign_id = %campaign_id,
                    grace_ms = grace.as_millis() as u64,
                    "Worker did not stop within grace period, aborting"
                );
                handle.abort();
                StopOutcome::Aborted
            }
        };

        self.entries.write().await.remove(&campaign_id);
        outcome
    }

    /// Stops every registered worker concurrently.
    pub async fn stop_all(&self, grace: Duration) -> Vec<(CampaignId, StopOutcome)> {
        let ids = self.snapshot().await;
        join_all(ids.into_iter().map(|id| async move { (id, self.stop(id, grace).await) })).await
    }
}
