//! Real-time domain events carried over the pub/sub bus.
//!
//! # Wire format
//!
//! ```json
//! {"eventType": "chat_assignment", "chatId": "...", "assigneeId": "...", ...}
//! ```
//!
//! Consumers decode in two passes: the `eventType` tag first, then the
//! payload for that tag. Unknown tags decode to `None` so producers can add
//! event types before every consumer knows about them.
//!
//! # Events
//!
//! - `NewMessage` - Campaign delivery outcome for one contact
//! - `ChatAssignment` / `ChatUnassignment` - Agent assignment changes
//! - `NewNotification` - System-wide notice
//! - `CampaignStatusChanged` - Campaign completed or failed

mod payloads;

pub use payloads::{
    CampaignStatusChanged, ChatAssignment, ChatUnassignment, DeliveryStatus, NewMessage,
    NewNotification,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{OrganizationId, UserId};

/// Tagged union of everything the hub can route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
pub enum DomainEvent {
    NewMessage(NewMessage),
    ChatAssignment(ChatAssignment),
    ChatUnassignment(ChatUnassignment),
    NewNotification(NewNotification),
    CampaignStatusChanged(CampaignStatusChanged),
}

/// Who should receive an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRoute {
    /// Every open connection.
    Broadcast,
    /// Connections authenticated for this organization.
    Organization(OrganizationId),
    /// Connections authenticated as this user.
    User(UserId),
}

/// Errors raised while decoding a bus payload.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("payload is not a tagged event: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("invalid {event_type} payload: {source}")]
    InvalidPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct EventTag {
    #[serde(rename = "eventType")]
    event_type: String,
}

impl DomainEvent {
    /// The `eventType` tag written on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::NewMessage(_) => "new_message",
            DomainEvent::ChatAssignment(_) => "chat_assignment",
            DomainEvent::ChatUnassignment(_) => "chat_unassignment",
            DomainEvent::NewNotification(_) => "new_notification",
            DomainEvent::CampaignStatusChanged(_) => "campaign_status_changed",
        }
    }

    /// Routing policy for the real-time hub.
    pub fn route(&self) -> EventRoute {
        match self {
            DomainEvent::NewNotification(_) => EventRoute::Broadcast,
            DomainEvent::ChatAssignment(e) => EventRoute::User(e.assignee_id),
            DomainEvent::ChatUnassignment(e) => EventRoute::User(e.previous_assignee_id),
            DomainEvent::NewMessage(e) => EventRoute::Organization(e.organization_id),
            DomainEvent::CampaignStatusChanged(e) => EventRoute::Organization(e.organization_id),
        }
    }

    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a bus payload.
    ///
    /// Returns `Ok(None)` for well-formed payloads with a tag this build
    /// does not know.
    pub fn from_wire(bytes: &[u8]) -> Result<Option<DomainEvent>, EventDecodeError> {
        let tag: EventTag = serde_json::from_slice(bytes).map_err(EventDecodeError::Malformed)?;

        let invalid = |source| EventDecodeError::InvalidPayload {
            event_type: tag.event_type.clone(),
            source,
        };

        let event = match tag.event_type.as_str() {
            "new_message" => DomainEvent::NewMessage(serde_json::from_slice(bytes).map_err(invalid)?),
            "chat_assignment" => {
                DomainEvent::ChatAssignment(serde_json::from_slice(bytes).map_err(invalid)?)
            }
            "chat_unassignment" => {
                DomainEvent::ChatUnassignment(serde_json::from_slice(bytes).map_err(invalid)?)
            }
            "new_notification" => {
                DomainEvent::NewNotification(serde_json::from_slice(bytes).map_err(invalid)?)
            }
            "campaign_status_changed" => {
                DomainEvent::CampaignStatusChanged(serde_json::from_slice(bytes).map_err(invalid)?)
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::campaign::CampaignStatus;
    use crate::domain::foundation::{CampaignId, ContactId, ExternalMessageId, Timestamp};
    use uuid::Uuid;

    fn assignment(assignee: UserId) -> DomainEvent {
        DomainEvent::ChatAssignment(ChatAssignment {
            chat_id: Uuid::new_v4(),
            organization_id: OrganizationId::new(),
            assignee_id: assignee,
            assigned_by: None,
            occurred_at: Timestamp::now(),
        })
    }

    #[test]
    fn serializes_with_snake_case_tag_and_camel_case_fields() {
        let event = DomainEvent::NewMessage(NewMessage {
            campaign_id: CampaignId::new(),
            organization_id: OrganizationId::new(),
            contact_id: ContactId::new(3),
            status: DeliveryStatus::Sent,
            external_message_id: Some(ExternalMessageId::new("wamid.X")),
            reason: None,
            attempts: 1,
            occurred_at: Timestamp::now(),
        });

        let json = String::from_utf8(event.to_wire().unwrap()).unwrap();
        assert!(json.contains("\"eventType\":\"new_message\""));
        assert!(json.contains("\"contactId\":3"));
        assert!(json.contains("\"externalMessageId\":\"wamid.X\""));
        assert!(!json.contains("reason"));
    }

    #[test]
    fn wire_round_trip_preserves_event() {
        let event = assignment(UserId::new());
        let decoded = DomainEvent::from_wire(&event.to_wire().unwrap()).unwrap();
        assert_eq!(decoded, Some(event));
    }

    #[test]
    fn unknown_tag_decodes_to_none() {
        let payload = br#"{"eventType":"chat_archived","chatId":"x"}"#;
        assert!(DomainEvent::from_wire(payload).unwrap().is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let event = DomainEvent::NewNotification(NewNotification {
            notification_id: Uuid::new_v4(),
            title: "Maintenance at 02:00".to_string(),
            occurred_at: Timestamp::now(),
        });
        let mut value = serde_json::to_value(&event).unwrap();
        value["addedLater"] = serde_json::json!({"nested": true});

        let decoded = DomainEvent::from_wire(value.to_string().as_bytes()).unwrap();
        assert_eq!(decoded, Some(event));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = DomainEvent::from_wire(b"not json").unwrap_err();
        assert!(matches!(err, EventDecodeError::Malformed(_)));

        let err = DomainEvent::from_wire(br#"{"noTag":1}"#).unwrap_err();
        assert!(matches!(err, EventDecodeError::Malformed(_)));
    }

    #[test]
    fn known_tag_with_bad_payload_is_invalid() {
        let err = DomainEvent::from_wire(br#"{"eventType":"chat_assignment","chatId":5}"#)
            .unwrap_err();
        match err {
            EventDecodeError::InvalidPayload { event_type, .. } => {
                assert_eq!(event_type, "chat_assignment")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn routing_follows_event_kind() {
        let user = UserId::new();
        assert_eq!(assignment(user).route(), EventRoute::User(user));

        let previous = UserId::new();
        let unassigned = DomainEvent::ChatUnassignment(ChatUnassignment {
            chat_id: Uuid::new_v4(),
            organization_id: OrganizationId::new(),
            previous_assignee_id: previous,
            occurred_at: Timestamp::now(),
        });
        assert_eq!(unassigned.route(), EventRoute::User(previous));

        let org = OrganizationId::new();
        let status = DomainEvent::CampaignStatusChanged(CampaignStatusChanged {
            campaign_id: CampaignId::new(),
            organization_id: org,
            status: CampaignStatus::Completed,
            reason: None,
            occurred_at: Timestamp::now(),
        });
        assert_eq!(status.route(), EventRoute::Organization(org));
        assert_eq!(status.event_type(), "campaign_status_changed");
    }
}
