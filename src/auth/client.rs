//! OAuth2 HTTP client
//!
//! Stateless wrapper over the GHL token endpoint. Both grants are form-encoded POSTs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret, SecretString};
use serde_json::Value;

use super::config::OAuth2Config;
use super::credential::TokenGrant;
use super::error::{AuthError, AuthResult};
use crate::utils::logging::*;
use crate::utils::truncate_safe;

/// The two token-endpoint exchanges the token manager depends on.
///
/// Implemented by `OAuth2Client` in production and by scripted issuers in tests.
#[async_trait]
pub trait OAuthExchange: Send + Sync {
    /// `grant_type=authorization_code`
    async fn exchange_code(&self, code: &str) -> AuthResult<TokenGrant>;

    /// `grant_type=refresh_token`
    async fn refresh(&self, refresh_token: &SecretString) -> AuthResult<TokenGrant>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum GrantKind {
    AuthorizationCode,
    RefreshToken,
}

pub struct OAuth2Client {
    config: OAuth2Config,
    http_client: Client,
}

impl OAuth2Client {
    pub fn new(config: OAuth2Config) -> AuthResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AuthError::InvalidRequest(format!("failed to build OAuth HTTP client: {}", e)))?;

        Ok(Self { config, http_client })
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    async fn post_token_form(&self, kind: GrantKind, form: &[(&str, &str)]) -> AuthResult<TokenGrant> {
        let response = self
            .http_client
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return parse_token_response(&body);
        }

        let detail = issuer_error_detail(status, &body);

        if is_transient_status(status) {
            log_warning(&format!("⚠️ [OAuth2] Token endpoint unavailable: {}", detail));
            return Err(AuthError::Transient(detail));
        }

        if status.is_client_error() {
            log_error(&format!("❌ [OAuth2] Token endpoint rejected {:?} grant: {}", kind, detail));
            return Err(match kind {
                GrantKind::AuthorizationCode => AuthError::AuthorizationFailed(detail),
                GrantKind::RefreshToken => AuthError::InvalidGrant(detail),
            });
        }

        Err(AuthError::ProtocolError(format!("unexpected token endpoint response: {}", detail)))
    }
}

#[async_trait]
impl OAuthExchange for OAuth2Client {
    async fn exchange_code(&self, code: &str) -> AuthResult<TokenGrant> {
        if code.trim().is_empty() {
            return Err(AuthError::InvalidRequest("authorization code is empty".to_string()));
        }

        log_info(&format!(
            "🔐 [OAuth2] Exchanging authorization code {}... for tokens",
            truncate_safe(code, 6)
        ));

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        self.post_token_form(GrantKind::AuthorizationCode, &form).await
    }

    async fn refresh(&self, refresh_token: &SecretString) -> AuthResult<TokenGrant> {
        if refresh_token.expose_secret().trim().is_empty() {
            return Err(AuthError::InvalidRequest("refresh token is empty".to_string()));
        }

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret().as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
        ];

        self.post_token_form(GrantKind::RefreshToken, &form).await
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// `error: error_description` when the issuer sent the OAuth error shape, else the raw body
fn issuer_error_detail(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|json| json.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let detail = match (field("error"), field("error_description").or_else(|| field("message"))) {
        (Some(error), Some(description)) => format!("{}: {}", error, description),
        (Some(error), None) => error,
        (None, Some(description)) => description,
        (None, None) => truncate_safe(body, 200).to_string(),
    };

    format!("[{}] {}", status.as_u16(), detail)
}

fn parse_token_response(body: &str) -> AuthResult<TokenGrant> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| AuthError::ProtocolError(format!("token response is not JSON: {}", e)))?;

    let access_token = json
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::ProtocolError("token response has no access_token".to_string()))?;

    let expires_in = json
        .get("expires_in")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .ok_or_else(|| AuthError::ProtocolError("token response has no numeric expires_in".to_string()))?;

    let text = |name: &str| {
        json.get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(TokenGrant {
        access_token: Secret::new(access_token.to_string()),
        refresh_token: text("refresh_token").map(Secret::new),
        expires_in,
        scope: text("scope"),
        location_id: text("locationId"),
        user_type: text("userType"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer) -> OAuth2Client {
        let mut config = OAuth2Config::new("client-1", "secret-1", "https://bot.example.com/oauth/callback");
        config.token_url = server.url("/oauth/token");
        OAuth2Client::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_exchange_code_sends_form_and_parses_grant() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .x_www_form_urlencoded_tuple("grant_type", "authorization_code")
                    .x_www_form_urlencoded_tuple("code", "code-123")
                    .x_www_form_urlencoded_tuple("client_id", "client-1")
                    .x_www_form_urlencoded_tuple("client_secret", "secret-1")
                    .x_www_form_urlencoded_tuple("redirect_uri", "https://bot.example.com/oauth/callback");
                then.status(200).json_body(json!({
                    "access_token": "access-1",
                    "token_type": "Bearer",
                    "expires_in": 86399,
                    "refresh_token": "refresh-1",
                    "scope": "contacts.readonly",
                    "locationId": "loc-1",
                    "userType": "Location"
                }));
            })
            .await;

        let grant = client_for(&server).exchange_code("code-123").await.unwrap();

        mock.assert_async().await;
        assert_eq!(grant.access_token.expose_secret(), "access-1");
        assert_eq!(grant.refresh_token.as_ref().unwrap().expose_secret(), "refresh-1");
        assert_eq!(grant.expires_in, 86399);
        assert_eq!(grant.location_id.as_deref(), Some("loc-1"));
        assert_eq!(grant.user_type.as_deref(), Some("Location"));
    }

    #[tokio::test]
    async fn test_refresh_sends_refresh_grant() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth/token")
                    .x_www_form_urlencoded_tuple("grant_type", "refresh_token")
                    .x_www_form_urlencoded_tuple("refresh_token", "refresh-1");
                then.status(200).json_body(json!({"access_token": "access-2", "expires_in": 3600}));
            })
            .await;

        let grant = client_for(&server)
            .refresh(&Secret::new("refresh-1".to_string()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(grant.access_token.expose_secret(), "access-2");
        assert!(grant.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_rejected_code_is_authorization_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(400)
                    .json_body(json!({"error": "invalid_grant", "error_description": "code expired"}));
            })
            .await;

        let err = client_for(&server).exchange_code("bad-code").await.unwrap_err();
        match err {
            AuthError::AuthorizationFailed(detail) => {
                assert!(detail.contains("invalid_grant"));
                assert!(detail.contains("code expired"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_invalid_grant() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(401).json_body(json!({"error": "invalid_grant"}));
            })
            .await;

        let err = client_for(&server)
            .refresh(&Secret::new("revoked".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn test_server_errors_and_throttling_are_transient() {
        for status in [500u16, 502, 408, 429] {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/oauth/token");
                    then.status(status).body("busy");
                })
                .await;

            let err = client_for(&server)
                .refresh(&Secret::new("refresh".to_string()))
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::Transient(_)), "status {status} gave {err:?}");
        }
    }

    #[tokio::test]
    async fn test_malformed_success_is_protocol_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200).json_body(json!({"token_type": "Bearer", "expires_in": "soon"}));
            })
            .await;

        let err = client_for(&server)
            .refresh(&Secret::new("refresh".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProtocolError(_)));
    }

    #[tokio::test]
    async fn test_unreachable_issuer_is_transient() {
        let mut config = OAuth2Config::new("id", "secret", "https://bot.example.com/cb");
        config.token_url = "http://127.0.0.1:1/oauth/token".to_string();
        let client = OAuth2Client::new(config).unwrap();

        let err = client.refresh(&Secret::new("refresh".to_string())).await.unwrap_err();
        assert!(matches!(err, AuthError::Transient(_)));
    }

    #[tokio::test]
    async fn test_empty_inputs_rejected_before_network() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200);
            })
            .await;
        let client = client_for(&server);

        assert!(matches!(client.exchange_code("  ").await, Err(AuthError::InvalidRequest(_))));
        assert!(matches!(
            client.refresh(&Secret::new(String::new())).await,
            Err(AuthError::InvalidRequest(_))
        ));
        assert_eq!(mock.hits_async().await, 0);
    }
}
