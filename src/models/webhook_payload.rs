use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Event posted by GHL to `/webhook`.
///
/// Only the fields the bot acts on are typed; everything else lands in `extra`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WebhookPayload {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(rename = "contactId", alias = "contact_id", default)]
    pub contact_id: Option<String>,
    #[serde(rename = "locationId", alias = "location_id", default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub message: Option<MessageField>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// `message` arrives either as plain text or as an object
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum MessageField {
    Text(String),
    Object {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
}

impl MessageField {
    pub fn text(&self) -> Option<&str> {
        let text = match self {
            MessageField::Text(text) => Some(text.as_str()),
            MessageField::Object { text, body } => text.as_deref().or(body.as_deref()),
        };
        text.map(str::trim).filter(|t| !t.is_empty())
    }
}

/// An inbound customer message the bot should answer
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub tenant_id: String,
    pub contact_id: String,
    pub text: String,
}

impl WebhookPayload {
    pub fn is_message_event(&self) -> bool {
        matches!(
            self.event_type.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("message") | Some("inboundmessage")
        )
    }

    /// Extracts the message to answer, or `None` when the event is not actionable.
    ///
    /// Events without a `locationId` are attributed to `default_tenant`.
    pub fn inbound_message(&self, default_tenant: Option<&str>) -> Option<InboundMessage> {
        if !self.is_message_event() {
            return None;
        }

        let contact_id = self.contact_id.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
        let text = self.message.as_ref().and_then(MessageField::text)?;
        let tenant_id = self
            .location_id
            .as_deref()
            .or(default_tenant)
            .map(str::trim)
            .filter(|t| !t.is_empty())?;

        Some(InboundMessage {
            tenant_id: tenant_id.to_string(),
            contact_id: contact_id.to_string(),
            text: text.to_string(),
        })
    }
}
