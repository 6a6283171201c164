// GHL sales bot library
// Exposes the modules to the binary and to the integration tests

pub mod auth;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub settings: config::Settings,
    pub oauth_config: auth::OAuth2Config,
    pub token_manager: Arc<auth::TokenManager>,
    pub gateway: services::GhlGateway,
    pub responder: services::SalesResponder,
}

impl AppState {
    pub fn new(
        settings: config::Settings,
        oauth_config: auth::OAuth2Config,
        token_manager: Arc<auth::TokenManager>,
        ghl_client: ghl::GhlClient,
    ) -> Self {
        let gateway = services::GhlGateway::new(ghl_client, token_manager.clone());
        let responder = services::SalesResponder::new(settings.bot.clone());

        Self {
            settings,
            oauth_config,
            token_manager,
            gateway,
            responder,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/ping", get(handlers::ping))
        .route("/health", get(handlers::health_check))
        .route("/webhook", post(handlers::handle_webhook))
        .route("/oauth/authorize", get(auth::start_oauth_flow))
        .route("/oauth/callback", get(auth::handle_oauth_callback))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/tokens/:tenant_id", get(handlers::token_status))
        .route("/admin/tokens/:tenant_id/invalidate", post(handlers::invalidate_token))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_admin_key))
        .with_state(state);

    public_routes
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
