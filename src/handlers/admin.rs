use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::utils::logging::*;
use crate::utils::AppResult;
use crate::AppState;

/// GET /admin/tokens/:tenant_id
pub async fn token_status(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> AppResult<Json<Value>> {
    log_request_received("/admin/tokens/:tenant_id", "GET");

    let status = state.token_manager.status(&tenant_id).await?;

    Ok(Json(json!({
        "success": true,
        "token": status,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// POST /admin/tokens/:tenant_id/invalidate
pub async fn invalidate_token(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> AppResult<Json<Value>> {
    log_request_received("/admin/tokens/:tenant_id/invalidate", "POST");

    state.token_manager.invalidate(&tenant_id);
    log_info(&format!("🗑️ Token for tenant {} invalidated by admin", tenant_id));

    Ok(Json(json!({
        "success": true,
        "tenant_id": tenant_id,
        "message": "Cached token evicted; the next request refreshes it"
    })))
}
