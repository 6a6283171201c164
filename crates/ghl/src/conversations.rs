//! Conversations endpoints (outbound SMS)

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::GhlClient;
use crate::error::{GhlError, Result};

/// Result of `POST /conversations/messages`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

impl GhlClient {
    /// Sends an outbound SMS to a contact
    pub async fn send_sms(&self, access_token: &str, contact_id: &str, message: &str) -> Result<SentMessage> {
        if contact_id.trim().is_empty() {
            return Err(GhlError::ValidationError("contact_id is empty".to_string()));
        }
        if message.trim().is_empty() {
            return Err(GhlError::ValidationError("message is empty".to_string()));
        }

        let body = json!({
            "contactId": contact_id,
            "message": message,
            "type": "SMS",
            "direction": "outbound"
        });

        let response: Value = self.post_json(access_token, "conversations/messages", &body).await?;
        let sent: SentMessage = serde_json::from_value(response).unwrap_or_default();

        tracing::info!("SMS sent successfully to {}", contact_id);

        Ok(sent)
    }
}
