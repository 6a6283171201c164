use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

pub fn log_request_received(endpoint: &str, method: &str) {
    info!("Request received: {} {}", method, endpoint);
}

pub fn log_request_processed(endpoint: &str, status: u16, duration_ms: u64) {
    info!("Request processed: {} - Status: {} - Duration: {}ms",
          endpoint, status, duration_ms);
}

pub fn log_config_loaded(env: &str) {
    info!("Configuration loaded successfully for environment: {}", env);
}

pub fn log_server_startup(port: u16) {
    info!("🚀 GHL sales bot server starting on port {}", port);
}

pub fn log_server_ready(port: u16) {
    info!("✅ Server ready and listening on http://0.0.0.0:{}", port);
}

pub fn log_health_check() {
    debug!("Health check requested");
}

pub fn log_validation_error(field: &str, message: &str) {
    warn!("Validation error: {} - {}", field, message);
}

pub fn log_token_refreshed(tenant_id: &str, expires_at: &DateTime<Utc>) {
    info!(tenant_id, %expires_at, "🔄 Access token refreshed for tenant {}", tenant_id);
}

/// Operator alert: the tenant's refresh token is dead and someone has to re-run the
/// install flow. Filter on `alert = "ghl_reauthorization_required"`.
pub fn log_reauthorization_required(tenant_id: &str, reason: &str) {
    error!(
        alert = "ghl_reauthorization_required",
        tenant_id,
        reason,
        "🚨 GHL re-authorization required for tenant {}: {}",
        tenant_id,
        reason
    );
}

pub fn log_ghl_api_error(operation: &str, tenant_id: &str, error: &str) {
    error!("GHL API error: {} - Tenant: {} - Error: {}", operation, tenant_id, error);
}

pub fn log_sms_sent(tenant_id: &str, contact_id: &str) {
    info!("📤 SMS reply sent - Tenant: {} - Contact: {}", tenant_id, contact_id);
}

pub fn log_info(message: &str) {
    info!("{}", message);
}

pub fn log_error(message: &str) {
    error!("{}", message);
}

pub fn log_warning(message: &str) {
    warn!("{}", message);
}
