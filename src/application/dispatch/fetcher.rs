//! ContactBatchFetcher - cursor pagination over a campaign's contacts.

use std::sync::Arc;

use crate::domain::campaign::Contact;
use crate::domain::foundation::{CampaignId, ContactId, DomainError};
use crate::ports::CampaignStore;

/// Fetches pages of contacts strictly after a cursor, in id order.
///
/// The store is expected to order, deduplicate and bound the page itself.
/// The fetcher re-applies those guarantees to whatever comes back, since
/// the worker's resume-after-cursor correctness depends on them.
#[derive(Clone)]
pub struct ContactBatchFetcher {
    store: Arc<dyn CampaignStore>,
}

impl ContactBatchFetcher {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    /// Returns up to `limit` contacts with id greater than `after`,
    /// ascending and unique. An empty page means the campaign is exhausted.
    pub async fn fetch_next_batch(
        &self,
        campaign_id: &CampaignId,
        after: Option<ContactId>,
        limit: u32,
    ) -> Result<Vec<Contact>, DomainError> {
        if limit == 0 {
            return Err(DomainError::validation("limit", "Page size must be positive"));
        }

        let page = self
            .store
            .fetch_contact_page(campaign_id, after, limit)
            .await?;
        Ok(normalize_page(page, after, limit))
    }
}

fn normalize_page(mut page: Vec<Contact>, after: Option<ContactId>, limit: u32) -> Vec<Contact> {
    page.retain(|c| after.map_or(true, |cursor| c.id > cursor));
    page.sort_by_key(|c| c.id);
    page.dedup_by_key(|c| c.id);
    page.truncate(limit as usize);
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryCampaignStore;
    use crate::domain::campaign::{AccountCredentials, Campaign, CampaignStatus, TemplateRef};
    use crate::domain::foundation::{ErrorCode, OrganizationId};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    /// Returns its rows as-is, ignoring cursor and limit.
    struct CarelessStore(Vec<Contact>);

    #[async_trait]
    impl CampaignStore for CarelessStore {
        async fn list_running_campaigns(
            &self,
        ) -> Result<Vec<(Campaign, Option<AccountCredentials>)>, DomainError> {
            Ok(vec![])
        }

        async fn fetch_contact_page(
            &self,
            _campaign_id: &CampaignId,
            _after: Option<ContactId>,
            _limit: u32,
        ) -> Result<Vec<Contact>, DomainError> {
            Ok(self.0.clone())
        }

        async fn update_campaign_cursor(
            &self,
            _campaign_id: &CampaignId,
            _cursor: ContactId,
        ) -> Result<(), DomainError> {
            Ok(())
        }

        async fn update_campaign_status(
            &self,
            _campaign_id: &CampaignId,
            _status: CampaignStatus,
        ) -> Result<(), DomainError> {
            Ok(())
        }
    }

    fn ids(page: &[Contact]) -> Vec<i64> {
        page.iter().map(|c| c.id.value()).collect()
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let fetcher = ContactBatchFetcher::new(Arc::new(CarelessStore(vec![])));
        let err = fetcher
            .fetch_next_batch(&CampaignId::new(), None, 0)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn misbehaving_store_output_is_normalized() {
        let rows = [9, 2, 5, 2, 1, 7, 5]
            .into_iter()
            .map(|id| Contact::new(id, format!("+{}", id)))
            .collect();
        let fetcher = ContactBatchFetcher::new(Arc::new(CarelessStore(rows)));

        let page = fetcher
            .fetch_next_batch(&CampaignId::new(), Some(ContactId::new(2)), 3)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![5, 7, 9]);
    }

    #[tokio::test]
    async fn exhausted_campaign_yields_empty_page() {
        let campaign = Campaign::new(OrganizationId::new(), "c", TemplateRef::new("t", "en"), vec![1]);
        let store = InMemoryCampaignStore::new();
        store.insert_campaign(campaign.clone(), None).await;
        store.add_contacts(1, [Contact::new(1, "+1")]).await;
        let fetcher = ContactBatchFetcher::new(Arc::new(store));

        let page = fetcher
            .fetch_next_batch(&campaign.id, Some(ContactId::new(1)), 10)
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    proptest! {
        /// Walking every page visits each reachable contact exactly once,
        /// in ascending order, however the lists overlap.
        #[test]
        fn pagination_visits_every_contact_once(
            lists in prop::collection::vec(prop::collection::vec(1i64..200, 0..40), 1..5),
            batch in 1u32..20,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let list_ids: Vec<i64> = (0..lists.len() as i64).collect();
                let campaign = Campaign::new(
                    OrganizationId::new(), "c", TemplateRef::new("t", "en"), list_ids.clone(),
                );
                let store = InMemoryCampaignStore::new();
                store.insert_campaign(campaign.clone(), None).await;
                for (list_id, members) in list_ids.iter().zip(&lists) {
                    store
                        .add_contacts(*list_id, members.iter().map(|id| Contact::new(*id, "+1")))
                        .await;
                }
                let fetcher = ContactBatchFetcher::new(Arc::new(store));

                let mut seen = Vec::new();
                let mut cursor = None;
                loop {
                    let page = fetcher.fetch_next_batch(&campaign.id, cursor, batch).await.unwrap();
                    prop_assert!(page.len() <= batch as usize);
                    match page.last() {
                        Some(last) => cursor = Some(last.id),
                        None => break,
                    }
                    seen.extend(ids(&page));
                }

                let expected: Vec<i64> = lists.iter().flatten().copied()
                    .collect::<BTreeSet<_>>().into_iter().collect();
                prop_assert_eq!(seen, expected);
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
