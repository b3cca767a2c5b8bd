//! Event payloads.
//!
//! Payloads carry ids rather than full entities so bus messages stay small.
//! Clients fetch anything else they need from the CRUD API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::campaign::CampaignStatus;
use crate::domain::foundation::{
    CampaignId, ContactId, ExternalMessageId, OrganizationId, Timestamp, UserId,
};

// ════════════════════════════════════════════════════════════════════════════
// NewMessage
// ════════════════════════════════════════════════════════════════════════════

/// Delivery state reported for one campaign contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// Published once per contact when its dispatch reaches a terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub campaign_id: CampaignId,
    pub organization_id: OrganizationId,
    pub contact_id: ContactId,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_message_id: Option<ExternalMessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub attempts: u32,
    pub occurred_at: Timestamp,
}

// ════════════════════════════════════════════════════════════════════════════
// Chat assignment
// ════════════════════════════════════════════════════════════════════════════

/// A conversation was assigned to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAssignment {
    pub chat_id: Uuid,
    pub organization_id: OrganizationId,
    pub assignee_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<UserId>,
    pub occurred_at: Timestamp,
}

/// A conversation was taken away from an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUnassignment {
    pub chat_id: Uuid,
    pub organization_id: OrganizationId,
    pub previous_assignee_id: UserId,
    pub occurred_at: Timestamp,
}

// ════════════════════════════════════════════════════════════════════════════
// NewNotification
// ════════════════════════════════════════════════════════════════════════════

/// System-wide notice shown to every connected dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub notification_id: Uuid,
    pub title: String,
    pub occurred_at: Timestamp,
}

// ════════════════════════════════════════════════════════════════════════════
// CampaignStatusChanged
// ════════════════════════════════════════════════════════════════════════════

/// The dispatch engine moved a campaign to a new status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatusChanged {
    pub campaign_id: CampaignId,
    pub organization_id: OrganizationId,
    pub status: CampaignStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub occurred_at: Timestamp,
}
