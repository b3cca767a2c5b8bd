//! Units of outbound work and their outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CampaignId, ContactId, ExternalMessageId, OrganizationId};

use super::{Campaign, Contact};

/// Rendered template ready to hand to the messaging API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMessage {
    pub template_name: String,
    pub language: String,
    pub variables: Vec<String>,
    /// Opaque reference forwarded to the API so retries can be deduplicated.
    pub client_reference: String,
}

/// One outbound message job: a contact plus its rendered content.
#[derive(Debug, Clone)]
pub struct DispatchUnit {
    pub campaign_id: CampaignId,
    pub organization_id: OrganizationId,
    pub contact: Contact,
    pub message: TemplateMessage,
    /// Number of send attempts made so far.
    pub attempt: u32,
}

impl DispatchUnit {
    /// Renders the campaign template for a contact.
    pub fn render(campaign: &Campaign, contact: Contact) -> Self {
        let variables = campaign
            .template
            .parameters
            .iter()
            .map(|key| contact.variable(key))
            .collect();

        let message = TemplateMessage {
            template_name: campaign.template.name.clone(),
            language: campaign.template.language.clone(),
            variables,
            client_reference: idempotency_key(&campaign.id, &contact.id),
        };

        Self {
            campaign_id: campaign.id,
            organization_id: campaign.organization_id,
            contact,
            message,
            attempt: 0,
        }
    }

    pub fn idempotency_key(&self) -> &str {
        &self.message.client_reference
    }

    pub fn contact_id(&self) -> ContactId {
        self.contact.id
    }
}

/// `<campaign-id>:<contact-id>`
pub fn idempotency_key(campaign_id: &CampaignId, contact_id: &ContactId) -> String {
    format!("{}:{}", campaign_id, contact_id)
}

/// Result of a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(ExternalMessageId),
    /// Worth retrying: transport, throttling or upstream 5xx.
    TransientFailure {
        reason: String,
        /// Minimum wait the API asked for before retrying.
        retry_after: Option<Duration>,
    },
    /// Retrying cannot help: validation or authorization.
    PermanentFailure(String),
}

impl SendOutcome {
    pub fn is_transient(&self) -> bool {
        matches!(self, SendOutcome::TransientFailure { .. })
    }
}

/// Final state of a dispatch unit after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent {
        contact_id: ContactId,
        external_id: ExternalMessageId,
        attempts: u32,
    },
    Failed {
        contact_id: ContactId,
        reason: String,
        attempts: u32,
    },
}

impl DispatchOutcome {
    pub fn contact_id(&self) -> ContactId {
        match self {
            DispatchOutcome::Sent { contact_id, .. } | DispatchOutcome::Failed { contact_id, .. } => {
                *contact_id
            }
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent { .. })
    }
}
