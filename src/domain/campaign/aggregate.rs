//! Campaign read model as seen by the dispatch engine.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::foundation::{CampaignId, ContactId, OrganizationId, Timestamp};

use super::CampaignStatus;

/// Reference to a pre-approved message template on the messaging API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    pub name: String,
    pub language: String,
    /// Contact fields substituted into the template, in placeholder order.
    ///
    /// `name` and `phone_number` resolve to the contact's own fields; any
    /// other key is looked up in the contact's attributes.
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl TemplateRef {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }
}

/// Message budget per time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub messages: u32,
    pub interval: Duration,
}

impl RateLimit {
    pub fn new(messages: u32, interval: Duration) -> Self {
        Self { messages, interval }
    }

    pub fn per_second(messages: u32) -> Self {
        Self::new(messages, Duration::from_secs(1))
    }

    /// A zero budget or zero window cannot pace anything.
    pub fn is_valid(&self) -> bool {
        self.messages > 0 && !self.interval.is_zero()
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::per_second(20)
    }
}

/// A campaign with everything a worker needs to dispatch it.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: CampaignId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub status: CampaignStatus,
    pub template: TemplateRef,
    pub contact_list_ids: Vec<i64>,
    /// Id of the last contact whose page was fully processed.
    pub cursor: Option<ContactId>,
    pub rate_limit: RateLimit,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Campaign {
    /// Creates a running campaign with default pacing and no progress.
    pub fn new(
        organization_id: OrganizationId,
        name: impl Into<String>,
        template: TemplateRef,
        contact_list_ids: Vec<i64>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: CampaignId::new(),
            organization_id,
            name: name.into(),
            status: CampaignStatus::Running,
            template,
            contact_list_ids,
            cursor: None,
            rate_limit: RateLimit::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_cursor(mut self, cursor: ContactId) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Moves the cursor forward. Returns false (and leaves the cursor alone)
    /// if `next` would not advance it.
    pub fn advance_cursor(&mut self, next: ContactId) -> bool {
        if self.cursor.map_or(true, |current| next > current) {
            self.cursor = Some(next);
            self.updated_at = Timestamp::now();
            true
        } else {
            false
        }
    }
}

/// Credentials of the sending account a campaign is attached to.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub account_id: String,
    /// Sender phone-number id on the messaging API.
    pub phone_number_id: String,
    pub access_token: SecretString,
    /// Overrides the configured API base URL for this account.
    pub api_base_url: Option<String>,
}

impl AccountCredentials {
    pub fn new(
        account_id: impl Into<String>,
        phone_number_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            phone_number_id: phone_number_id.into(),
            access_token: SecretString::new(access_token.into()),
            api_base_url: None,
        }
    }
}
