//! Pipeline-based auto replies

use crate::config::BotSettings;
use crate::models::InboundMessage;
use crate::utils::logging::*;

use super::gateway::{GatewayError, GhlGateway};

#[derive(Debug, Clone, PartialEq)]
pub struct BotReply {
    pub pipeline: String,
    pub reply: String,
    pub message_id: Option<String>,
}

#[derive(Clone)]
pub struct SalesResponder {
    bot: BotSettings,
}

impl SalesResponder {
    pub fn new(bot: BotSettings) -> Self {
        Self { bot }
    }

    /// Sales pipeline contacts get the hand-off reply, everyone else the generic one
    pub fn reply_for_pipeline(&self, pipeline: &str) -> &str {
        if pipeline.trim().eq_ignore_ascii_case(self.bot.sales_pipeline.trim()) {
            &self.bot.sales_reply
        } else {
            &self.bot.default_reply
        }
    }

    /// Looks up the contact's pipeline and answers by SMS
    pub async fn respond(&self, gateway: &GhlGateway, message: &InboundMessage) -> Result<BotReply, GatewayError> {
        let pipeline = gateway
            .contact_pipeline(&message.tenant_id, &message.contact_id)
            .await?;
        let reply = self.reply_for_pipeline(&pipeline).to_string();

        let sent = gateway
            .send_sms(&message.tenant_id, &message.contact_id, &reply)
            .await?;
        log_sms_sent(&message.tenant_id, &message.contact_id);

        Ok(BotReply {
            pipeline,
            reply,
            message_id: sent.message_id,
        })
    }
}
