//! Authentication middleware for the `/admin/*` endpoints
//!
//! Requests must carry the configured key in the `X-Admin-Key` header.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

/// Guards admin routes with `server.admin_api_key` (env `ADMIN_API_KEY`).
///
/// # Usage
///
/// ```bash
/// curl -H "X-Admin-Key: $ADMIN_API_KEY" http://localhost:8000/admin/tokens/<location-id>
/// ```
///
/// # Responses
///
/// - key configured and matching: request continues
/// - key configured, header missing or wrong: **401**
/// - no key configured, development: request continues (with a warning)
/// - no key configured, production: **503**
pub async fn require_admin_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let provided_key = headers
        .get("X-Admin-Key")
        .and_then(|v| v.to_str().ok());

    let expected_key = state
        .settings
        .server
        .admin_api_key
        .as_deref()
        .filter(|k| !k.is_empty());

    let is_production = state.settings.server.is_production();

    match (expected_key, provided_key, is_production) {
        (Some(expected), Some(provided), _) if constant_time_eq(expected, provided) => {
            tracing::debug!("✅ Admin access granted");
            Ok(next.run(request).await)
        }

        (Some(_), provided, _) => {
            tracing::warn!(
                "❌ Admin access denied - Invalid or missing X-Admin-Key: {:?}",
                provided.map(|_| "<redacted>")
            );
            Err(unauthorized_response())
        }

        (None, _, false) => {
            tracing::warn!(
                "⚠️  ADMIN_API_KEY not configured - Allowing access in development mode. \
                 Configure ADMIN_API_KEY in production!"
            );
            Ok(next.run(request).await)
        }

        (None, _, true) => {
            tracing::error!("🚨 ADMIN_API_KEY not configured in production! Blocking admin access.");
            Err(service_unavailable_response())
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Unauthorized",
            "message": "Missing or invalid X-Admin-Key header",
            "hint": "Include X-Admin-Key header with valid API key"
        })),
    )
        .into_response()
}

fn service_unavailable_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "Service Unavailable",
            "message": "ADMIN_API_KEY not configured on server",
            "hint": "Contact administrator to configure ADMIN_API_KEY"
        })),
    )
        .into_response()
}
