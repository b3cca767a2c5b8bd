//! CampaignStore port - relational store consumed by the dispatch engine.
//!
//! The store is the system of record for campaign status and progress.
//! Dashboards read status and cursor from it; nothing in the dispatch
//! engine treats in-memory state as authoritative.

use async_trait::async_trait;

use crate::domain::campaign::{AccountCredentials, Campaign, CampaignStatus, Contact};
use crate::domain::foundation::{CampaignId, ContactId, DomainError};

/// Port for reading campaigns and recording their progress.
///
/// # Contract
///
/// - `list_running_campaigns` returns every campaign with status Running,
///   joined to its sending-account credentials (`None` when the account is
///   missing).
/// - `fetch_contact_page` returns contacts reachable through the campaign's
///   lists with id strictly greater than `after`, ascending, deduplicated,
///   at most `limit` rows.
/// - `update_campaign_cursor` must never move a cursor backwards.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn list_running_campaigns(
        &self,
    ) -> Result<Vec<(Campaign, Option<AccountCredentials>)>, DomainError>;

    async fn fetch_contact_page(
        &self,
        campaign_id: &CampaignId,
        after: Option<ContactId>,
        limit: u32,
    ) -> Result<Vec<Contact>, DomainError>;

    async fn update_campaign_cursor(
        &self,
        campaign_id: &CampaignId,
        cursor: ContactId,
    ) -> Result<(), DomainError>;

    async fn update_campaign_status(
        &self,
        campaign_id: &CampaignId,
        status: CampaignStatus,
    ) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn CampaignStore) {}
}
