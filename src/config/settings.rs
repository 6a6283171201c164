use serde::{Deserialize, Serialize};
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub ghl: GhlSettings,
    #[serde(default)]
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub bot: BotSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// `production` blocks admin routes when no admin key is configured
    pub environment: String,
    pub admin_api_key: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            environment: "development".to_string(),
            admin_api_key: None,
        }
    }
}

impl ServerSettings {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GhlSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_base_url: String,
    pub api_version: String,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub scopes: Option<Vec<String>>,
    /// Tenant used when an OAuth callback carries neither `state` nor a `locationId`
    pub default_location_id: Option<String>,
}

impl Default for GhlSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            api_base_url: ghl::DEFAULT_BASE_URL.to_string(),
            api_version: ghl::DEFAULT_API_VERSION.to_string(),
            authorize_url: None,
            token_url: None,
            scopes: None,
            default_location_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OAuthSettings {
    pub safety_margin_secs: i64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub attempt_timeout_secs: u64,
    pub store_max_attempts: u32,
    pub store_backoff_ms: u64,
    pub background_refresh: bool,
    pub refresh_interval_secs: u64,
    pub refresh_lead_secs: i64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            safety_margin_secs: 60,
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
            attempt_timeout_secs: 10,
            store_max_attempts: 3,
            store_backoff_ms: 200,
            background_refresh: true,
            refresh_interval_secs: 300,
            refresh_lead_secs: 900,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub credentials_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            credentials_path: "data/ghl_credentials.json".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BotSettings {
    /// Pipeline name (case-insensitive) that gets the sales reply
    pub sales_pipeline: String,
    pub sales_reply: String,
    pub default_reply: String,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            sales_pipeline: "sales".to_string(),
            sales_reply: "Thank you for your interest! A sales representative will contact you shortly."
                .to_string(),
            default_reply: "Thank you for your message. How can we help you today?".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            // Base file
            .add_source(File::with_name("config/default").required(false))
            // Per-environment file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        // Plain variable names used by existing deployments
        for (var, key) in [
            ("GHL_CLIENT_ID", "ghl.client_id"),
            ("GHL_CLIENT_SECRET", "ghl.client_secret"),
            ("GHL_REDIRECT_URI", "ghl.redirect_uri"),
            ("GHL_LOCATION_ID", "ghl.default_location_id"),
            ("GHL_API_BASE_URL", "ghl.api_base_url"),
            ("GHL_TOKEN_URL", "ghl.token_url"),
            ("CREDENTIALS_PATH", "storage.credentials_path"),
            ("ADMIN_API_KEY", "server.admin_api_key"),
            ("RUST_ENV", "server.environment"),
            ("PORT", "server.port"),
        ] {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SALES_BOT")
                .prefix_separator("__")
                .separator("__"),
        );

        Self::build(builder)
    }

    /// Deserializes and validates a prepared builder
    pub fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ghl.client_id.trim().is_empty() {
            return Err(ConfigError::Message("GHL_CLIENT_ID is not configured".to_string()));
        }
        if self.ghl.client_secret.trim().is_empty() {
            return Err(ConfigError::Message("GHL_CLIENT_SECRET is not configured".to_string()));
        }

        let redirect = self.ghl.redirect_uri.as_str();
        if !(redirect.starts_with("http://") || redirect.starts_with("https://")) {
            return Err(ConfigError::Message(format!(
                "GHL_REDIRECT_URI must start with http:// or https:// (got '{}')",
                redirect
            )));
        }

        if self.oauth.max_attempts == 0 {
            return Err(ConfigError::Message("oauth.max_attempts must be at least 1".to_string()));
        }
        if self.oauth.safety_margin_secs < 0 {
            return Err(ConfigError::Message("oauth.safety_margin_secs must not be negative".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Settings, ConfigError> {
        Settings::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    const MINIMAL: &str = r#"
        [ghl]
        client_id = "client"
        client_secret = "secret"
        redirect_uri = "https://bot.example.com/oauth/callback"
    "#;

    #[test]
    fn test_minimal_file_gets_defaults() {
        let settings = from_toml(MINIMAL).unwrap();

        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.ghl.api_version, "2021-04-15");
        assert_eq!(settings.oauth.max_attempts, 3);
        assert_eq!(settings.oauth.attempt_timeout_secs, 10);
        assert_eq!(settings.storage.backend, StorageBackend::File);
        assert_eq!(settings.bot.sales_pipeline, "sales");
    }

    #[test]
    fn test_sections_override_defaults() {
        let toml = format!(
            "{}\n[storage]\nbackend = \"memory\"\n[oauth]\nsafety_margin_secs = 120\n[server]\nenvironment = \"production\"\n",
            MINIMAL
        );
        let settings = from_toml(&toml).unwrap();

        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.oauth.safety_margin_secs, 120);
        assert!(settings.server.is_production());
    }

    #[test]
    fn test_missing_client_credentials_rejected() {
        let err = from_toml("[ghl]\nredirect_uri = \"https://x\"\n").unwrap_err();
        assert!(err.to_string().contains("GHL_CLIENT_ID"));
    }

    #[test]
    fn test_redirect_uri_must_be_http() {
        let toml = "[ghl]\nclient_id = \"c\"\nclient_secret = \"s\"\nredirect_uri = \"ftp://bot\"\n";
        let err = from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("GHL_REDIRECT_URI"));
    }
}
