//! In-Memory Campaign Store Adapter
//!
//! Holds campaigns, contact lists and sending accounts in memory, with
//! failure injection for exercising the dispatch engine's error paths.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::campaign::{AccountCredentials, Campaign, CampaignStatus, Contact};
use crate::domain::foundation::{CampaignId, ContactId, DomainError, ErrorCode, Timestamp};
use crate::ports::CampaignStore;

#[derive(Debug, Clone)]
struct StoredCampaign {
    campaign: Campaign,
    credentials: Option<AccountCredentials>,
    cursor_history: Vec<ContactId>,
}

/// Failure budget: the next `n` calls fail.
#[derive(Debug, Default)]
struct FailNext(AtomicU32);

impl FailNext {
    fn set(&self, n: u32) {
        self.0.store(n, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory campaign store
#[derive(Debug, Clone, Default)]
pub struct InMemoryCampaignStore {
    campaigns: Arc<RwLock<HashMap<CampaignId, StoredCampaign>>>,
    lists: Arc<RwLock<HashMap<i64, Vec<Contact>>>>,
    fail_list: Arc<FailNext>,
    fail_fetch: Arc<FailNext>,
    fail_cursor: Arc<FailNext>,
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_campaign(&self, campaign: Campaign, credentials: Option<AccountCredentials>) {
        self.campaigns.write().await.insert(
            campaign.id,
            StoredCampaign {
                campaign,
                credentials,
                cursor_history: Vec::new(),
            },
        );
    }

    /// Adds contacts to a contact list, creating the list if needed.
    pub async fn add_contacts(&self, list_id: i64, contacts: impl IntoIterator<Item = Contact>) {
        self.lists
            .write()
            .await
            .entry(list_id)
            .or_default()
            .extend(contacts);
    }

    /// Status change made by the CRUD tier (pause, resume, delete-to-draft).
    pub async fn set_status(&self, campaign_id: &CampaignId, status: CampaignStatus) {
        if let Some(stored) = self.campaigns.write().await.get_mut(campaign_id) {
            stored.campaign.status = status;
            stored.campaign.updated_at = Timestamp::now();
        }
    }

    pub async fn remove_campaign(&self, campaign_id: &CampaignId) {
        self.campaigns.write().await.remove(campaign_id);
    }

    // === Failure injection ===

    pub fn fail_next_list_running(&self, n: u32) {
        self.fail_list.set(n);
    }

    pub fn fail_next_fetches(&self, n: u32) {
        self.fail_fetch.set(n);
    }

    pub fn fail_next_cursor_writes(&self, n: u32) {
        self.fail_cursor.set(n);
    }

    // === Test Helpers ===

    pub async fn campaign(&self, campaign_id: &CampaignId) -> Option<Campaign> {
        self.campaigns
            .read()
            .await
            .get(campaign_id)
            .map(|s| s.campaign.clone())
    }

    pub async fn status(&self, campaign_id: &CampaignId) -> Option<CampaignStatus> {
        self.campaign(campaign_id).await.map(|c| c.status)
    }

    pub async fn cursor(&self, campaign_id: &CampaignId) -> Option<ContactId> {
        self.campaign(campaign_id).await.and_then(|c| c.cursor)
    }

    /// Every cursor value written, in order.
    pub async fn cursor_history(&self, campaign_id: &CampaignId) -> Vec<ContactId> {
        self.campaigns
            .read()
            .await
            .get(campaign_id)
            .map(|s| s.cursor_history.clone())
            .unwrap_or_default()
    }
}

fn not_found(campaign_id: &CampaignId) -> DomainError {
    DomainError::new(
        ErrorCode::CampaignNotFound,
        format!("Campaign {} not found", campaign_id),
    )
}

fn injected(operation: &str) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Injected failure: {}", operation),
    )
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn list_running_campaigns(
        &self,
    ) -> Result<Vec<(Campaign, Option<AccountCredentials>)>, DomainError> {
        if self.fail_list.take() {
            return Err(injected("list_running_campaigns"));
        }
        Ok(self
            .campaigns
            .read()
            .await
            .values()
            .filter(|s| s.campaign.status.is_dispatchable())
            .map(|s| (s.campaign.clone(), s.credentials.clone()))
            .collect())
    }

    async fn fetch_contact_page(
        &self,
        campaign_id: &CampaignId,
        after: Option<ContactId>,
        limit: u32,
    ) -> Result<Vec<Contact>, DomainError> {
        if self.fail_fetch.take() {
            return Err(injected("fetch_contact_page"));
        }
        let list_ids = self
            .campaigns
            .read()
            .await
            .get(campaign_id)
            .map(|s| s.campaign.contact_list_ids.clone())
            .ok_or_else(|| not_found(campaign_id))?;

        let lists = self.lists.read().await;
        let mut unique: BTreeMap<ContactId, Contact> = BTreeMap::new();
        for contact in list_ids.iter().filter_map(|id| lists.get(id)).flatten() {
            if after.map_or(true, |cursor| contact.id > cursor) {
                unique.entry(contact.id).or_insert_with(|| contact.clone());
            }
        }

        Ok(unique.into_values().take(limit as usize).collect())
    }

    async fn update_campaign_cursor(
        &self,
        campaign_id: &CampaignId,
        cursor: ContactId,
    ) -> Result<(), DomainError> {
        if self.fail_cursor.take() {
            return Err(injected("update_campaign_cursor"));
        }
        let mut campaigns = self.campaigns.write().await;
        let stored = campaigns
            .get_mut(campaign_id)
            .ok_or_else(|| not_found(campaign_id))?;

        if stored.campaign.advance_cursor(cursor) {
            stored.cursor_history.push(cursor);
        }
        Ok(())
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &CampaignId,
        status: CampaignStatus,
    ) -> Result<(), DomainError> {
        let mut campaigns = self.campaigns.write().await;
        let stored = campaigns
            .get_mut(campaign_id)
            .ok_or_else(|| not_found(campaign_id))?;
        stored.campaign.status = status;
        stored.campaign.updated_at = Timestamp::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::campaign::TemplateRef;
    use crate::domain::foundation::OrganizationId;

    fn campaign(lists: Vec<i64>) -> Campaign {
        Campaign::new(
            OrganizationId::new(),
            "test",
            TemplateRef::new("t", "en"),
            lists,
        )
    }

    async fn store_with(campaign: &Campaign) -> InMemoryCampaignStore {
        let store = InMemoryCampaignStore::new();
        store.insert_campaign(campaign.clone(), None).await;
        store
    }

    #[tokio::test]
    async fn pages_are_ordered_deduplicated_and_bounded() {
        let c = campaign(vec![1, 2]);
        let store = store_with(&c).await;
        store
            .add_contacts(1, [Contact::new(5, "+5"), Contact::new(1, "+1"), Contact::new(3, "+3")])
            .await;
        store
            .add_contacts(2, [Contact::new(3, "+3"), Contact::new(2, "+2")])
            .await;

        let first = store.fetch_contact_page(&c.id, None, 3).await.unwrap();
        let ids: Vec<i64> = first.iter().map(|c| c.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let rest = store
            .fetch_contact_page(&c.id, Some(ContactId::new(3)), 3)
            .await
            .unwrap();
        let ids: Vec<i64> = rest.iter().map(|c| c.id.value()).collect();
        assert_eq!(ids, vec![5]);
    }

    #[tokio::test]
    async fn only_running_campaigns_are_listed() {
        let running = campaign(vec![]);
        let store = store_with(&running).await;
        let mut paused = campaign(vec![]);
        paused.status = CampaignStatus::Paused;
        store.insert_campaign(paused, None).await;

        let listed = store.list_running_campaigns().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0.id, running.id);
    }

    #[tokio::test]
    async fn cursor_writes_never_regress() {
        let c = campaign(vec![]);
        let store = store_with(&c).await;

        store.update_campaign_cursor(&c.id, ContactId::new(4)).await.unwrap();
        store.update_campaign_cursor(&c.id, ContactId::new(2)).await.unwrap();
        store.update_campaign_cursor(&c.id, ContactId::new(9)).await.unwrap();

        assert_eq!(store.cursor(&c.id).await, Some(ContactId::new(9)));
        assert_eq!(
            store.cursor_history(&c.id).await,
            vec![ContactId::new(4), ContactId::new(9)]
        );
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let c = campaign(vec![]);
        let store = store_with(&c).await;
        store.fail_next_list_running(2);

        assert!(store.list_running_campaigns().await.is_err());
        assert!(store.list_running_campaigns().await.is_err());
        assert!(store.list_running_campaigns().await.is_ok());
    }

    #[tokio::test]
    async fn unknown_campaign_is_not_found() {
        let store = InMemoryCampaignStore::new();
        let err = store
            .update_campaign_status(&CampaignId::new(), CampaignStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CampaignNotFound);
    }
}
