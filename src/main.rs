//! GHL sales bot
//!
//! - `/webhook` acknowledges GHL events at once and answers inbound messages in the
//!   background (pipeline lookup, then SMS reply)
//! - `/oauth/*` runs the marketplace install flow
//! - a `TokenManager` keeps one refreshed credential per location, persisted to the
//!   configured credential store, with an optional refresh-ahead job

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use ghl_sales_bot::auth::{
    CredentialStore, FileCredentialStore, InMemoryCredentialStore, OAuth2Client, OAuth2Config, RefreshPolicy,
    TokenManager, TokenRefresher,
};
use ghl_sales_bot::config::{Settings, StorageBackend};
use ghl_sales_bot::utils::logging::*;
use ghl_sales_bot::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; deployed environments set the variables directly
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if dotenv_loaded {
        tracing::info!("✅ .env file loaded");
    }

    let settings = Settings::new().context("Failed to load settings")?;
    log_config_loaded(&settings.server.environment);

    let store: Arc<dyn CredentialStore> = match settings.storage.backend {
        StorageBackend::File => {
            log_info(&format!(
                "💾 Credentials stored in {}",
                settings.storage.credentials_path
            ));
            Arc::new(FileCredentialStore::new(&settings.storage.credentials_path))
        }
        StorageBackend::Memory => {
            log_warning("⚠️ In-memory credential store: every restart requires re-authorization");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let oauth_config = OAuth2Config::from_settings(&settings);
    let oauth_client = OAuth2Client::new(oauth_config.clone()).context("Failed to create OAuth client")?;

    let token_manager = Arc::new(TokenManager::new(
        Arc::new(oauth_client),
        store,
        RefreshPolicy::from_settings(&settings.oauth),
    ));
    log_info("✅ TokenManager initialized");

    let ghl_client = ghl::GhlClient::with_base_url(&settings.ghl.api_base_url)
        .context("Failed to create GHL client")?
        .with_api_version(&settings.ghl.api_version);

    let refresher = if settings.oauth.background_refresh {
        let refresher = TokenRefresher::new(
            token_manager.clone(),
            settings.oauth.refresh_interval_secs,
            settings.oauth.refresh_lead_secs,
        );
        refresher.start().await;
        Some(refresher)
    } else {
        log_info("ℹ️ Background token refresh disabled");
        None
    };

    let port = settings.server.port;
    let address = format!("{}:{}", settings.server.host, port);

    let app_state = Arc::new(AppState::new(settings, oauth_config, token_manager, ghl_client));
    let app = build_router(app_state);

    log_server_startup(port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    log_server_ready(port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(refresher) = refresher {
        refresher.stop().await;
    }

    log_info("🛑 Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log_error(&format!("Failed to install Ctrl+C handler: {}", e));
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log_error(&format!("Failed to install SIGTERM handler: {}", e));
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log_info("🛑 Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            log_info("🛑 Received SIGTERM, shutting down gracefully...");
        }
    }
}
