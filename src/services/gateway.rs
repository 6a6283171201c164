//! Authenticated access to the GHL API
//!
//! Every call obtains a token from the `TokenManager`. A 401 from GHL means the token was
//! revoked or rotated behind our back: the gateway reports that exact token as rejected,
//! fetches a fresh one and retries the call exactly once.

use std::future::Future;
use std::sync::Arc;

use ghl::{GhlClient, GhlError, SentMessage};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::auth::{AuthError, TokenManager};
use crate::utils::logging::*;
use crate::utils::AppError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] GhlError),
}

impl GatewayError {
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, GatewayError::Auth(e) if e.requires_reauthorization())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Auth(e) => AppError::Auth(e),
            GatewayError::Api(e) => AppError::from(e),
        }
    }
}

#[derive(Clone)]
pub struct GhlGateway {
    client: GhlClient,
    tokens: Arc<TokenManager>,
}

impl GhlGateway {
    pub fn new(client: GhlClient, tokens: Arc<TokenManager>) -> Self {
        Self { client, tokens }
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub async fn contact_pipeline(&self, tenant_id: &str, contact_id: &str) -> Result<String, GatewayError> {
        self.with_token(tenant_id, "get_contact_pipeline", |client, token| {
            let contact_id = contact_id.to_string();
            async move { client.get_contact_pipeline(&token, &contact_id).await }
        })
        .await
    }

    pub async fn send_sms(&self, tenant_id: &str, contact_id: &str, message: &str) -> Result<SentMessage, GatewayError> {
        self.with_token(tenant_id, "send_sms", |client, token| {
            let contact_id = contact_id.to_string();
            let message = message.to_string();
            async move { client.send_sms(&token, &contact_id, &message).await }
        })
        .await
    }

    async fn with_token<T, F, Fut>(&self, tenant_id: &str, operation: &str, call: F) -> Result<T, GatewayError>
    where
        F: Fn(GhlClient, String) -> Fut,
        Fut: Future<Output = ghl::Result<T>>,
    {
        let token = self.tokens.get_valid_token(tenant_id).await?;

        match call(self.client.clone(), token.expose_secret().clone()).await {
            Err(e) if e.is_unauthorized() => {
                log_warning(&format!(
                    "⚠️ [Gateway] {} rejected the token for tenant {}, refreshing and retrying once",
                    operation, tenant_id
                ));
                self.tokens.invalidate_rejected(tenant_id, &token);

                let token = self.tokens.get_valid_token(tenant_id).await?;
                call(self.client.clone(), token.expose_secret().clone())
                    .await
                    .map_err(|e| {
                        log_ghl_api_error(operation, tenant_id, &e.to_string());
                        GatewayError::Api(e)
                    })
            }
            Err(e) => {
                log_ghl_api_error(operation, tenant_id, &e.to_string());
                Err(GatewayError::Api(e))
            }
            Ok(value) => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, CredentialStore, InMemoryCredentialStore, OAuthExchange, RefreshPolicy, TokenGrant};
    use crate::auth::AuthResult;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use httpmock::prelude::*;
    use secrecy::{Secret, SecretString};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RotatingIssuer {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl OAuthExchange for RotatingIssuer {
        async fn exchange_code(&self, _code: &str) -> AuthResult<TokenGrant> {
            Err(AuthError::AuthorizationFailed("not used".to_string()))
        }

        async fn refresh(&self, _refresh_token: &SecretString) -> AuthResult<TokenGrant> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenGrant {
                access_token: Secret::new(format!("fresh-{}", n)),
                refresh_token: None,
                expires_in: 3600,
                scope: None,
                location_id: None,
                user_type: None,
            })
        }
    }

    async fn gateway(server: &MockServer, issuer: Arc<RotatingIssuer>) -> GhlGateway {
        let store = Arc::new(InMemoryCredentialStore::new());
        let now = Utc::now();
        let credential = Credential {
            tenant_id: "loc-1".to_string(),
            access_token: Secret::new("stale".to_string()),
            refresh_token: Secret::new("refresh".to_string()),
            expires_at: now + Duration::hours(1),
            scope: None,
            user_type: None,
            updated_at: now,
        };
        store.save("loc-1", &credential).await.unwrap();

        let manager = Arc::new(TokenManager::new(issuer, store, RefreshPolicy::default()));
        GhlGateway::new(GhlClient::with_base_url(server.base_url()).unwrap(), manager)
    }

    #[tokio::test]
    async fn test_unauthorized_triggers_one_refresh_and_retry() {
        let server = MockServer::start_async().await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(GET).path("/contacts/c-1").header("Authorization", "Bearer stale");
                then.status(401).json_body(json!({"message": "Invalid JWT"}));
            })
            .await;
        let accepted = server
            .mock_async(|when, then| {
                when.method(GET).path("/contacts/c-1").header("Authorization", "Bearer fresh-1");
                then.status(200)
                    .json_body(json!({"contact": {"id": "c-1", "pipeline": {"name": "Sales"}}}));
            })
            .await;

        let issuer = Arc::new(RotatingIssuer::default());
        let gateway = gateway(&server, issuer.clone()).await;

        let pipeline = gateway.contact_pipeline("loc-1", "c-1").await.unwrap();

        assert_eq!(pipeline, "Sales");
        rejected.assert_async().await;
        accepted.assert_async().await;
        assert_eq!(issuer.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_rejections_share_one_refresh() {
        let server = MockServer::start_async().await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(GET).path("/contacts/c-1").header("Authorization", "Bearer stale");
                then.status(401).json_body(json!({"message": "Invalid JWT"}));
            })
            .await;
        let accepted = server
            .mock_async(|when, then| {
                when.method(GET).path("/contacts/c-1").header("Authorization", "Bearer fresh-1");
                then.status(200)
                    .json_body(json!({"contact": {"id": "c-1", "pipeline": {"name": "Sales"}}}));
            })
            .await;

        let issuer = Arc::new(RotatingIssuer::default());
        let gateway = gateway(&server, issuer.clone()).await;

        // Warm the cache so both calls start from the same stale token
        gateway.token_manager().get_valid_token("loc-1").await.unwrap();

        let (a, b) = tokio::join!(
            gateway.contact_pipeline("loc-1", "c-1"),
            gateway.contact_pipeline("loc-1", "c-1")
        );

        assert_eq!(a.unwrap(), "Sales");
        assert_eq!(b.unwrap(), "Sales");
        assert_eq!(rejected.hits_async().await, 2);
        assert_eq!(accepted.hits_async().await, 2);
        assert_eq!(issuer.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_returned() {
        let server = MockServer::start_async().await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(POST).path("/conversations/messages");
                then.status(401).json_body(json!({"message": "Invalid JWT"}));
            })
            .await;

        let issuer = Arc::new(RotatingIssuer::default());
        let gateway = gateway(&server, issuer.clone()).await;

        let err = gateway.send_sms("loc-1", "c-1", "hello").await.unwrap_err();

        assert!(matches!(err, GatewayError::Api(GhlError::Unauthorized(_))));
        assert_eq!(rejected.hits_async().await, 2);
        assert_eq!(issuer.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tenant_never_reaches_api() {
        let server = MockServer::start_async().await;
        let any = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(200);
            })
            .await;

        let gateway = gateway(&server, Arc::new(RotatingIssuer::default())).await;
        let err = gateway.contact_pipeline("loc-unknown", "c-1").await.unwrap_err();

        assert!(err.requires_reauthorization());
        assert_eq!(any.hits_async().await, 0);
    }
}
