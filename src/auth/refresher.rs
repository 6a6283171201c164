//! Background refresh-ahead job
//!
//! Periodically walks the warm tenants and refreshes any credential that expires within
//! the lead time, so webhook processing rarely pays for a refresh on the hot path.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::error::AuthError;
use super::token_manager::TokenManager;
use crate::utils::logging::*;

#[derive(Clone)]
pub struct TokenRefresher {
    manager: Arc<TokenManager>,
    interval_seconds: u64,
    lead_time: ChronoDuration,
    running: Arc<RwLock<bool>>,
}

impl TokenRefresher {
    pub fn new(manager: Arc<TokenManager>, interval_seconds: u64, lead_time_seconds: i64) -> Self {
        Self {
            manager,
            interval_seconds: interval_seconds.max(1),
            lead_time: ChronoDuration::seconds(lead_time_seconds),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            log_warning("⚠️ [TokenRefresher] Already running");
            return;
        }
        *running = true;
        drop(running);

        let refresher = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(refresher.interval_seconds));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            log_info(&format!(
                "🔄 [TokenRefresher] Started (every {}s, lead time {}s)",
                refresher.interval_seconds,
                refresher.lead_time.num_seconds()
            ));

            loop {
                ticker.tick().await;

                if !*refresher.running.read().await {
                    break;
                }

                refresher.run_once().await;
            }

            log_info("🛑 [TokenRefresher] Stopped");
        });
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// One pass over the warm tenants. Returns how many passes failed.
    pub async fn run_once(&self) -> usize {
        let mut failures = 0;

        for tenant_id in self.manager.warm_tenants() {
            match self.manager.refresh_ahead(&tenant_id, self.lead_time).await {
                Ok(()) => {}
                Err(e @ (AuthError::InvalidGrant(_) | AuthError::NotAuthorized { .. })) => {
                    // Alert already raised by the manager
                    failures += 1;
                    tracing::debug!("Skipping tenant {}: {}", tenant_id, e);
                }
                Err(e) => {
                    failures += 1;
                    log_warning(&format!(
                        "⚠️ [TokenRefresher] Refresh ahead failed for tenant {}: {}",
                        tenant_id, e
                    ));
                }
            }
        }

        failures
    }
}
