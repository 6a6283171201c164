//! OAuth2 HTTP handlers
//!
//! Endpoints that start and complete the GHL install flow

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::credential::Credential;
use crate::utils::logging::*;
use crate::utils::{auth_error_status, redact, AppError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    /// Tenant the install is for; echoed back as `state`
    #[serde(alias = "state", alias = "locationId")]
    tenant: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    code: Option<String>,
    /// Tenant id set by `/oauth/authorize`
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /oauth/authorize
///
/// Returns the marketplace URL the operator opens to install the app.
pub async fn start_oauth_flow(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthorizeParams>,
) -> Json<Value> {
    log_request_received("/oauth/authorize", "GET");

    let tenant = params.tenant.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let authorization_url = state.oauth_config.authorization_url(tenant);

    log_info(&format!("↗️ [OAuth2] Authorization URL issued (tenant: {:?})", tenant));

    Json(json!({ "authorization_url": authorization_url }))
}

/// GET /oauth/callback?code=XXX&state=TENANT
///
/// Exchanges the code and installs the credential. The tenant is `state` when present,
/// else the location the issuer bound the grant to, else the configured default.
pub async fn handle_oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    log_request_received("/oauth/callback", "GET");

    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        log_error(&format!("❌ [OAuth2] Authorization denied: {} {}", error, description));
        return (StatusCode::BAD_REQUEST, render_error_page(&error, &description)).into_response();
    }

    let code = match params.code.filter(|c| !c.trim().is_empty()) {
        Some(code) => code,
        None => {
            log_error("❌ [OAuth2] Callback without code");
            return AppError::ValidationError("Missing code parameter".to_string()).into_response();
        }
    };

    log_info(&format!("🔑 [OAuth2] Callback received with code {}", redact(&code, 6)));

    let tenant = params.state.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let result = match tenant {
        Some(tenant_id) => state.token_manager.authorize(&code, tenant_id).await,
        None => {
            state
                .token_manager
                .authorize_issued_location(&code, state.settings.ghl.default_location_id.as_deref())
                .await
        }
    };

    match result {
        Ok(credential) => {
            log_info(&format!("✅ [OAuth2] Tenant {} installed", credential.tenant_id));
            render_success_page(&credential).into_response()
        }
        Err(e) => {
            log_error(&format!("❌ [OAuth2] Install failed: {}", e));
            (auth_error_status(&e), render_error_page("authorization_failed", &e.to_string())).into_response()
        }
    }
}

fn render_success_page(credential: &Credential) -> Html<String> {
    Html(format!(
        r#"
        <!DOCTYPE html>
        <html>
        <head>
            <title>GHL Sales Bot - Authorized</title>
            <meta charset="UTF-8">
            <style>
                body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Arial, sans-serif;
                       max-width: 720px; margin: 50px auto; padding: 20px; background: #f5f5f5; }}
                .container {{ background: white; padding: 30px; border-radius: 12px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
                .success {{ background: #d4edda; border: 2px solid #28a745; padding: 20px; border-radius: 8px; }}
                h1 {{ color: #28a745; margin-top: 0; }}
                dt {{ font-weight: bold; margin-top: 10px; }}
            </style>
        </head>
        <body>
            <div class="container">
                <div class="success">
                    <h1>✅ Authorization Successful!</h1>
                    <p>The sales bot can now answer messages for this location.</p>
                    <dl>
                        <dt>Location</dt><dd>{}</dd>
                        <dt>Access token valid until</dt><dd>{}</dd>
                        <dt>Scope</dt><dd>{}</dd>
                    </dl>
                </div>
                <p>You can close this window now.</p>
            </div>
        </body>
        </html>
        "#,
        html_escape(&credential.tenant_id),
        credential.expires_at.to_rfc3339(),
        html_escape(credential.scope.as_deref().unwrap_or("-"))
    ))
}

fn render_error_page(error: &str, description: &str) -> Html<String> {
    Html(format!(
        r#"
        <!DOCTYPE html>
        <html>
        <head>
            <title>GHL Sales Bot - Authorization Failed</title>
            <meta charset="UTF-8">
            <style>
                body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Arial, sans-serif;
                       max-width: 720px; margin: 50px auto; padding: 20px; background: #f5f5f5; }}
                .container {{ background: white; padding: 30px; border-radius: 12px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
                .error {{ background: #f8d7da; border: 2px solid #dc3545; padding: 20px; border-radius: 8px; }}
                h1 {{ color: #dc3545; margin-top: 0; }}
                code {{ background: #eee; padding: 2px 6px; border-radius: 4px; }}
            </style>
        </head>
        <body>
            <div class="container">
                <div class="error">
                    <h1>❌ Authorization Failed</h1>
                    <p>Error: <code>{}</code></p>
                    <p>{}</p>
                </div>
                <p>Start again from <code>/oauth/authorize</code>.</p>
            </div>
        </body>
        </html>
        "#,
        html_escape(error),
        html_escape(description)
    ))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
