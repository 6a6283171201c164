use axum::{
    body::Bytes,
    extract::State,
    response::Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;

use crate::models::{InboundMessage, WebhookPayload};
use crate::utils::logging::*;
use crate::utils::{redact, AppError, AppResult};
use crate::AppState;

/// POST /webhook
///
/// Acknowledges immediately; the reply is produced in a background task so GHL never
/// waits on token refresh or the CRM API.
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let start_time = Instant::now();
    log_request_received("/webhook", "POST");

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        log_validation_error("payload", &format!("Invalid JSON: {}", e));
        AppError::ValidationError(format!("Invalid webhook payload: {}", e))
    })?;

    let default_tenant = state.settings.ghl.default_location_id.as_deref();

    match payload.inbound_message(default_tenant) {
        Some(message) => {
            log_info(&format!(
                "📥 Message from contact {} (tenant {}): {}",
                message.contact_id,
                message.tenant_id,
                redact(&message.text, 40)
            ));

            let state = Arc::clone(&state);
            tokio::spawn(async move {
                process_inbound_message(&state, message).await;
            });
        }
        None => {
            tracing::debug!(
                "Ignoring webhook event type {:?} (contact: {:?})",
                payload.event_type,
                payload.contact_id
            );
        }
    }

    let processing_time = start_time.elapsed().as_millis() as u64;
    log_request_processed("/webhook", 200, processing_time);

    Ok(Json(json!({ "status": "success" })))
}

/// Answers one inbound message. Failures are logged, never silently dropped; a dead
/// credential has already raised the re-authorization alert in the token manager, so it
/// is repeated here with the contact that went unanswered.
pub async fn process_inbound_message(state: &AppState, message: InboundMessage) {
    match state.responder.respond(&state.gateway, &message).await {
        Ok(reply) => {
            log_info(&format!(
                "✅ Replied to contact {} (pipeline: {:?})",
                message.contact_id, reply.pipeline
            ));
        }
        Err(e) if e.requires_reauthorization() => {
            log_reauthorization_required(
                &message.tenant_id,
                &format!("message from contact {} left unanswered: {}", message.contact_id, e),
            );
        }
        Err(e) => {
            log_error(&format!(
                "❌ Failed to answer contact {} (tenant {}): {}",
                message.contact_id, message.tenant_id, e
            ));
        }
    }
}
