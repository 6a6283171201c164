//! Token lifecycle manager with per-tenant refresh locking.
//!
//! Every tenant (GHL location) owns one credential. Reads are served from a sharded
//! in-memory cache and never wait on a lock. Anything that may touch the issuer or the
//! store (cold load, refresh, persist, authorize) runs under that tenant's async mutex,
//! so concurrent callers for one tenant trigger at most one refresh and unrelated
//! tenants never block each other.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::client::OAuthExchange;
use super::credential::{Credential, TokenGrant};
use super::error::{AuthError, AuthResult};
use super::store::CredentialStore;
use crate::config::OAuthSettings;
use crate::utils::logging::*;

/// Timing and retry knobs for refresh and persistence
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// A credential is treated as expired this long before `expires_at`
    pub safety_margin: Duration,
    /// Issuer attempts per refresh (transient failures only)
    pub max_attempts: u32,
    pub base_backoff: StdDuration,
    pub max_backoff: StdDuration,
    /// Upper bound for a single issuer call
    pub attempt_timeout: StdDuration,
    /// Store attempts per persist
    pub store_max_attempts: u32,
    pub store_backoff: StdDuration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            safety_margin: Duration::seconds(60),
            max_attempts: 3,
            base_backoff: StdDuration::from_millis(500),
            max_backoff: StdDuration::from_secs(8),
            attempt_timeout: StdDuration::from_secs(10),
            store_max_attempts: 3,
            store_backoff: StdDuration::from_millis(200),
        }
    }
}

impl RefreshPolicy {
    pub fn from_settings(settings: &OAuthSettings) -> Self {
        Self {
            safety_margin: Duration::seconds(settings.safety_margin_secs),
            max_attempts: settings.max_attempts.max(1),
            base_backoff: StdDuration::from_millis(settings.base_backoff_ms),
            max_backoff: StdDuration::from_millis(settings.max_backoff_ms),
            attempt_timeout: StdDuration::from_secs(settings.attempt_timeout_secs.max(1)),
            store_max_attempts: settings.store_max_attempts.max(1),
            store_backoff: StdDuration::from_millis(settings.store_backoff_ms),
        }
    }

    /// Exponential backoff before retry number `attempt` (1-based), capped at `max_backoff`
    pub fn backoff_for(&self, attempt: u32) -> StdDuration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Non-secret view of a tenant's credential, served by the admin endpoint
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TokenStatus {
    pub tenant_id: String,
    pub authorized: bool,
    pub cached: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in_secs: Option<i64>,
    pub usable: bool,
    pub invalidated: bool,
    pub reauthorization_required: bool,
    pub reauthorization_required_since: Option<DateTime<Utc>>,
    pub pending_persist: bool,
    pub scope: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct TokenManager {
    exchange: Arc<dyn OAuthExchange>,
    store: Arc<dyn CredentialStore>,
    policy: RefreshPolicy,
    cache: DashMap<String, Credential>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Access tokens reported stale, per tenant; `None` rejects whatever token is current
    invalidated: DashMap<String, Option<SecretString>>,
    /// Tenants whose refresh token was rejected; cleared by `authorize`
    reauth_required: DashMap<String, DateTime<Utc>>,
    /// Refreshed credentials the store has not accepted yet
    unpersisted: DashMap<String, Credential>,
}

impl TokenManager {
    pub fn new(exchange: Arc<dyn OAuthExchange>, store: Arc<dyn CredentialStore>, policy: RefreshPolicy) -> Self {
        Self {
            exchange,
            store,
            policy,
            cache: DashMap::new(),
            refresh_locks: DashMap::new(),
            invalidated: DashMap::new(),
            reauth_required: DashMap::new(),
            unpersisted: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// Returns an access token for the tenant that is valid for at least the safety margin.
    ///
    /// A usable cached credential is returned without any I/O. Otherwise the credential is
    /// loaded and refreshed under the tenant lock.
    pub async fn get_valid_token(&self, tenant_id: &str) -> AuthResult<SecretString> {
        validate_tenant(tenant_id)?;

        if let Some(token) = self.cached_token(tenant_id, self.policy.safety_margin) {
            return Ok(token);
        }

        self.ensure_fresh(tenant_id, self.policy.safety_margin).await
    }

    /// Refreshes the tenant's credential if it expires within `lead_time`.
    ///
    /// Goes through the same lock as `get_valid_token`, so it never races a foreground
    /// refresh.
    pub async fn refresh_ahead(&self, tenant_id: &str, lead_time: Duration) -> AuthResult<()> {
        validate_tenant(tenant_id)?;

        let lead_time = lead_time.max(self.policy.safety_margin);
        if self.cached_token(tenant_id, lead_time).is_some() && !self.unpersisted.contains_key(tenant_id) {
            return Ok(());
        }

        self.ensure_fresh(tenant_id, lead_time).await.map(|_| ())
    }

    /// Exchanges an authorization code and installs the resulting credential.
    ///
    /// Nothing is cached or persisted unless the exchange and the store both succeed.
    pub async fn authorize(&self, authorization_code: &str, tenant_id: &str) -> AuthResult<Credential> {
        validate_tenant(tenant_id)?;
        validate_code(authorization_code)?;

        let grant = self.exchange_code_bounded(authorization_code).await?;
        ensure_grant_location(tenant_id, &grant)?;

        let lock = self.lock_for(tenant_id);
        let _guard = lock.lock().await;

        self.install_grant(tenant_id, grant).await
    }

    /// Like `authorize`, for callbacks that do not say which tenant they belong to.
    ///
    /// The tenant is the location the issuer bound the grant to, else `fallback_tenant`.
    pub async fn authorize_issued_location(
        &self,
        authorization_code: &str,
        fallback_tenant: Option<&str>,
    ) -> AuthResult<Credential> {
        validate_code(authorization_code)?;

        let grant = self.exchange_code_bounded(authorization_code).await?;
        let tenant_id = grant
            .location_id
            .clone()
            .or_else(|| fallback_tenant.map(str::to_string))
            .filter(|tenant| !tenant.trim().is_empty())
            .ok_or_else(|| {
                AuthError::AuthorizationFailed(
                    "grant carries no locationId and no default location is configured".to_string(),
                )
            })?;

        let lock = self.lock_for(&tenant_id);
        let _guard = lock.lock().await;

        self.install_grant(&tenant_id, grant).await
    }

    /// Evicts the cached credential and forces the next `get_valid_token` to refresh,
    /// whatever token is current.
    pub fn invalidate(&self, tenant_id: &str) {
        self.cache.remove(tenant_id);
        self.invalidated.insert(tenant_id.to_string(), None);
        debug!("Credential for tenant {} invalidated", tenant_id);
    }

    /// Reports `rejected` as refused by the CRM API (401).
    ///
    /// Only that token is evicted. When the cache already holds a different token, another
    /// caller has refreshed in the meantime and nothing happens, so callers sharing one
    /// rejected token cause a single refresh.
    pub fn invalidate_rejected(&self, tenant_id: &str, rejected: &SecretString) {
        let superseded = self
            .cache
            .get(tenant_id)
            .map(|entry| !same_token(&entry.value().access_token, rejected))
            .unwrap_or(false);
        if superseded {
            debug!("Rejected token for tenant {} was already replaced", tenant_id);
            return;
        }

        self.cache
            .remove_if(tenant_id, |_, credential| same_token(&credential.access_token, rejected));
        self.invalidated
            .entry(tenant_id.to_string())
            .and_modify(|current| {
                if current.is_some() {
                    *current = Some(rejected.clone());
                }
            })
            .or_insert_with(|| Some(rejected.clone()));
        debug!("Rejected token for tenant {} invalidated", tenant_id);
    }

    /// Tenants with a cached (or pending) credential, i.e. the ones worth refreshing ahead
    pub fn warm_tenants(&self) -> Vec<String> {
        let mut tenants: BTreeSet<String> = self.cache.iter().map(|entry| entry.key().clone()).collect();
        tenants.extend(self.unpersisted.iter().map(|entry| entry.key().clone()));
        tenants.into_iter().collect()
    }

    pub async fn status(&self, tenant_id: &str) -> AuthResult<TokenStatus> {
        validate_tenant(tenant_id)?;

        let cached = self.cache.get(tenant_id).map(|entry| entry.value().clone());
        let is_cached = cached.is_some();
        let pending = self.unpersisted.get(tenant_id).map(|entry| entry.value().clone());
        let reauth_since = self.reauth_required.get(tenant_id).map(|entry| *entry.value());

        let credential = match pending.clone().or(cached) {
            Some(credential) => Some(credential),
            None if reauth_since.is_some() => None,
            None => self.store.load(tenant_id).await?,
        };
        let invalidated = credential
            .as_ref()
            .map(|c| self.is_rejected(tenant_id, &c.access_token))
            .unwrap_or(false);

        let now = Utc::now();
        Ok(TokenStatus {
            tenant_id: tenant_id.to_string(),
            authorized: credential.is_some() && reauth_since.is_none(),
            cached: is_cached,
            expires_at: credential.as_ref().map(|c| c.expires_at),
            expires_in_secs: credential.as_ref().map(|c| (c.expires_at - now).num_seconds()),
            usable: credential
                .as_ref()
                .map(|c| !invalidated && c.is_usable_at(now, self.policy.safety_margin))
                .unwrap_or(false),
            invalidated,
            reauthorization_required: reauth_since.is_some(),
            reauthorization_required_since: reauth_since,
            pending_persist: pending.is_some(),
            scope: credential.as_ref().and_then(|c| c.scope.clone()),
            updated_at: credential.as_ref().map(|c| c.updated_at),
        })
    }

    async fn exchange_code_bounded(&self, authorization_code: &str) -> AuthResult<TokenGrant> {
        let exchange = self.exchange.exchange_code(authorization_code);
        match tokio::time::timeout(self.policy.attempt_timeout, exchange).await {
            Ok(Ok(grant)) => Ok(grant),
            Ok(Err(e @ (AuthError::AuthorizationFailed(_) | AuthError::ProtocolError(_) | AuthError::InvalidRequest(_)))) => {
                Err(e)
            }
            Ok(Err(e)) => Err(AuthError::AuthorizationFailed(e.to_string())),
            Err(_) => Err(AuthError::AuthorizationFailed(format!(
                "code exchange timed out after {:?}",
                self.policy.attempt_timeout
            ))),
        }
    }

    /// Persists and caches a code-exchange grant. Caller holds the tenant lock.
    async fn install_grant(&self, tenant_id: &str, grant: TokenGrant) -> AuthResult<Credential> {
        ensure_grant_location(tenant_id, &grant)?;

        let credential = Credential::from_grant(tenant_id, grant, Utc::now()).ok_or_else(|| {
            AuthError::ProtocolError("authorization response has no refresh_token".to_string())
        })?;

        self.persist_with_retry(tenant_id, &credential).await?;

        self.cache.insert(tenant_id.to_string(), credential.clone());
        self.invalidated.remove(tenant_id);
        self.unpersisted.remove(tenant_id);
        self.reauth_required.remove(tenant_id);

        log_info(&format!(
            "✅ [TokenManager] Tenant {} authorized, access token valid until {}",
            tenant_id, credential.expires_at
        ));

        Ok(credential)
    }

    fn cached_token(&self, tenant_id: &str, margin: Duration) -> Option<SecretString> {
        self.cache
            .get(tenant_id)
            .filter(|entry| entry.value().is_usable(margin))
            .map(|entry| entry.value().access_token.clone())
            .filter(|token| !self.is_rejected(tenant_id, token))
    }

    fn is_rejected(&self, tenant_id: &str, token: &SecretString) -> bool {
        self.invalidated
            .get(tenant_id)
            .map(|entry| match entry.value() {
                Some(rejected) => same_token(rejected, token),
                None => true,
            })
            .unwrap_or(false)
    }

    fn lock_for(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Check, refresh, persist and cache under the tenant lock
    async fn ensure_fresh(&self, tenant_id: &str, margin: Duration) -> AuthResult<SecretString> {
        // Tenant locks are only created for tenants the store knows about
        let known = self.refresh_locks.contains_key(tenant_id) || self.cache.contains_key(tenant_id);
        if !known && self.store.load(tenant_id).await?.is_none() {
            return Err(AuthError::NotAuthorized {
                tenant_id: tenant_id.to_string(),
            });
        }

        let lock = self.lock_for(tenant_id);
        let _guard = lock.lock().await;

        // A concurrent caller may have finished the work while we waited
        if let Some(token) = self.cached_token(tenant_id, margin) {
            if !self.unpersisted.contains_key(tenant_id) {
                debug!("Token for tenant {} was refreshed by another request", tenant_id);
                return Ok(token);
            }
        }

        if self.reauth_required.contains_key(tenant_id) {
            return Err(AuthError::NotAuthorized {
                tenant_id: tenant_id.to_string(),
            });
        }

        if let Some(pending) = self.unpersisted.get(tenant_id).map(|entry| entry.value().clone()) {
            if let Err(e) = self.persist_with_retry(tenant_id, &pending).await {
                // The previous credential stays in service until the store recovers
                return match self.cached_token(tenant_id, self.policy.safety_margin) {
                    Some(token) => Ok(token),
                    None => Err(e),
                };
            }

            log_info(&format!(
                "💾 [TokenManager] Pending credential for tenant {} persisted",
                tenant_id
            ));
            self.unpersisted.remove(tenant_id);
            self.cache.insert(tenant_id.to_string(), pending.clone());
            self.invalidated.remove(tenant_id);

            if pending.is_usable(margin) {
                return Ok(pending.access_token);
            }
        }

        let current = match self.cache.get(tenant_id).map(|entry| entry.value().clone()) {
            Some(credential) => credential,
            None => {
                let loaded = self.store.load(tenant_id).await?.ok_or_else(|| AuthError::NotAuthorized {
                    tenant_id: tenant_id.to_string(),
                })?;
                debug!("Loaded credential for tenant {} from store", tenant_id);
                self.cache.insert(tenant_id.to_string(), loaded.clone());
                loaded
            }
        };

        let forced = self.is_rejected(tenant_id, &current.access_token);
        if !forced && current.is_usable(margin) {
            return Ok(current.access_token);
        }

        debug!(
            "Refreshing token for tenant {} (forced: {}, expires_at: {})",
            tenant_id, forced, current.expires_at
        );

        let grant = match self.refresh_with_retry(tenant_id, &current).await {
            Ok(grant) => grant,
            Err(e @ AuthError::InvalidGrant(_)) => {
                self.mark_reauthorization_required(tenant_id, &e);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let refreshed = current.refreshed(grant, Utc::now());

        if let Err(e) = self.persist_with_retry(tenant_id, &refreshed).await {
            log_error(&format!(
                "❌ [TokenManager] Refreshed credential for tenant {} not persisted, keeping it pending: {}",
                tenant_id, e
            ));
            self.unpersisted.insert(tenant_id.to_string(), refreshed);
            return Err(e);
        }

        self.cache.insert(tenant_id.to_string(), refreshed.clone());
        self.invalidated.remove(tenant_id);
        log_token_refreshed(tenant_id, &refreshed.expires_at);

        Ok(refreshed.access_token)
    }

    async fn refresh_with_retry(&self, tenant_id: &str, current: &Credential) -> AuthResult<TokenGrant> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            let call = self.exchange.refresh(&current.refresh_token);

            let failure = match tokio::time::timeout(self.policy.attempt_timeout, call).await {
                Ok(Ok(grant)) if grant.expires_in > 0 => return Ok(grant),
                Ok(Ok(grant)) => AuthError::ProtocolError(format!(
                    "issuer returned a token with expires_in={}",
                    grant.expires_in
                )),
                Ok(Err(AuthError::InvalidRequest(reason))) => return Err(AuthError::InvalidGrant(reason)),
                Ok(Err(e)) if e.is_transient() => e,
                Ok(Err(e)) => return Err(e),
                Err(_) => AuthError::Transient(format!(
                    "refresh attempt timed out after {:?}",
                    self.policy.attempt_timeout
                )),
            };

            last_failure = failure.to_string();
            log_warning(&format!(
                "⚠️ [TokenManager] Refresh attempt {}/{} for tenant {} failed: {}",
                attempt, max_attempts, tenant_id, last_failure
            ));

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.backoff_for(attempt)).await;
            }
        }

        log_error(&format!(
            "❌ [TokenManager] Giving up refreshing tenant {} after {} attempts",
            tenant_id, max_attempts
        ));

        Err(AuthError::RefreshFailed {
            attempts: max_attempts,
            reason: last_failure,
        })
    }

    async fn persist_with_retry(&self, tenant_id: &str, credential: &Credential) -> AuthResult<()> {
        let max_attempts = self.policy.store_max_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            match self.store.save(tenant_id, credential).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_failure = e.to_string();
                    log_warning(&format!(
                        "⚠️ [TokenManager] Store attempt {}/{} for tenant {} failed: {}",
                        attempt, max_attempts, tenant_id, last_failure
                    ));
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.store_backoff.saturating_mul(attempt)).await;
            }
        }

        Err(AuthError::StorageError(format!(
            "credential for tenant {} not persisted after {} attempts: {}",
            tenant_id, max_attempts, last_failure
        )))
    }

    fn mark_reauthorization_required(&self, tenant_id: &str, cause: &AuthError) {
        self.reauth_required.insert(tenant_id.to_string(), Utc::now());
        self.cache.remove(tenant_id);
        self.invalidated.remove(tenant_id);
        self.unpersisted.remove(tenant_id);

        log_reauthorization_required(tenant_id, &cause.to_string());
    }
}

fn validate_tenant(tenant_id: &str) -> AuthResult<()> {
    if tenant_id.trim().is_empty() {
        return Err(AuthError::InvalidRequest("tenant id is empty".to_string()));
    }
    Ok(())
}

/// A grant bound to a location may only be installed for that location
fn ensure_grant_location(tenant_id: &str, grant: &TokenGrant) -> AuthResult<()> {
    match grant.location_id.as_deref() {
        Some(issued_for) if issued_for != tenant_id => {
            log_error(&format!(
                "❌ [TokenManager] Grant issued for location {} refused for tenant {}",
                issued_for, tenant_id
            ));
            Err(AuthError::AuthorizationFailed(format!(
                "grant was issued for location {}, not {}",
                issued_for, tenant_id
            )))
        }
        _ => Ok(()),
    }
}

fn same_token(a: &SecretString, b: &SecretString) -> bool {
    a.expose_secret() == b.expose_secret()
}

fn validate_code(authorization_code: &str) -> AuthResult<()> {
    if authorization_code.trim().is_empty() {
        return Err(AuthError::InvalidRequest("authorization code is empty".to_string()));
    }
    Ok(())
}
