//! HTTP client for the GHL (LeadConnector) API

use crate::error::{GhlError, Result};
use reqwest::{Client as HttpClient, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Default LeadConnector API host
pub const DEFAULT_BASE_URL: &str = "https://services.leadconnectorhq.com";

/// API version pinned in the `Version` header on every request
pub const DEFAULT_API_VERSION: &str = "2021-04-15";

/// Client for the GHL REST API.
///
/// The client holds no credentials. Every call takes the bearer token to use, so the
/// caller stays in charge of token lifecycle (refresh, invalidation, retry).
#[derive(Clone)]
pub struct GhlClient {
    http_client: HttpClient,
    base_url: String,
    api_version: String,
}

impl GhlClient {
    /// Creates a client against the production API
    ///
    /// # Timeouts
    ///
    /// - Total: 30s
    /// - Connect: 5s
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom host (sandbox, mock server)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GhlError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(GhlError::ConfigError("GHL base URL is empty".to_string()));
        }

        Ok(Self {
            http_client,
            base_url,
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    /// Overrides the `Version` header value
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// GET request, JSON response
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, access_token: &str, endpoint: &str) -> Result<T> {
        let url = self.url(endpoint);

        tracing::debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .header("Version", &self.api_version)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let response = self.handle_response(response).await?;
        Ok(response.json().await?)
    }

    /// POST request with a JSON body, JSON response
    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        endpoint: &str,
        body: &Value,
    ) -> Result<T> {
        let url = self.url(endpoint);

        tracing::debug!("POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .header("Version", &self.api_version)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let response = self.handle_response(response).await?;
        Ok(response.json().await?)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Maps non-2xx responses onto `GhlError`
    async fn handle_response(&self, response: Response) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let status_code = status.as_u16();
        let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

        let message = if let Ok(json) = serde_json::from_str::<Value>(&error_body) {
            json.get("message")
                .or_else(|| json.get("error"))
                .or_else(|| json.get("msg"))
                .and_then(|v| v.as_str())
                .unwrap_or(&error_body)
                .to_string()
        } else {
            error_body
        };

        if status_code == 401 {
            tracing::warn!("GHL API rejected access token: {}", message);
            return Err(GhlError::Unauthorized(message));
        }

        tracing::error!("GHL API error ({}): {}", status_code, message);

        Err(GhlError::ApiError {
            status: status_code,
            message,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }
}
