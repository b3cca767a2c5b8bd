//! WebSocket envelope protocol.
//!
//! Both directions carry the same JSON shape:
//!
//! ```json
//! {"eventName": "ping", "messageId": "42", "data": {}}
//! ```
//!
//! Server-originated names: `connected`, `pong`, `error`, and one name per
//! domain event type (`new_message`, `chat_assignment`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::events::DomainEvent;
use crate::domain::foundation::{AuthenticatedUser, Timestamp};

use super::connections::ConnectionId;

pub const CONNECTED: &str = "connected";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const ERROR: &str = "error";

/// Error codes sent in `error` envelopes.
pub mod codes {
    pub const UNKNOWN_EVENT: &str = "UNKNOWN_EVENT";
    pub const INVALID_ENVELOPE: &str = "INVALID_ENVELOPE";
}

/// A single frame on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event_name: impl Into<String>, data: Value) -> Self {
        Self {
            event_name: event_name.into(),
            message_id: None,
            data,
        }
    }

    /// References the client frame this envelope answers.
    pub fn in_reply_to(mut self, message_id: Option<String>) -> Self {
        self.message_id = message_id;
        self
    }

    /// First frame after a successful upgrade.
    pub fn connected(connection_id: ConnectionId, user: &AuthenticatedUser) -> Self {
        Self::new(
            CONNECTED,
            json!({
                "connectionId": connection_id.to_string(),
                "userId": user.id.to_string(),
                "organizationId": user.organization_id.to_string(),
                "timestamp": Timestamp::now().to_rfc3339(),
            }),
        )
    }

    pub fn pong(message_id: Option<String>) -> Self {
        Self::new(PONG, json!({ "timestamp": Timestamp::now().to_rfc3339() }))
            .in_reply_to(message_id)
    }

    pub fn error(code: &str, message: impl Into<String>, message_id: Option<String>) -> Self {
        Self::new(
            ERROR,
            json!({
                "code": code,
                "message": message.into(),
            }),
        )
        .in_reply_to(message_id)
    }

    /// Wraps a domain event. `data` is the event payload without its tag.
    pub fn from_event(event: &DomainEvent) -> Result<Self, serde_json::Error> {
        let mut data = serde_json::to_value(event)?;
        if let Value::Object(fields) = &mut data {
            fields.remove("eventType");
        }
        Ok(Self::new(event.event_type(), data))
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
