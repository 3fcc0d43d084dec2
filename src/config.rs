use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WebhookError};
use crate::provider::nats::NatsConfig;

/// Settings for the webhook server and bus consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub oauth: OAuthConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address for the HTTP server (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP server (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Parameter names looked up in the secret store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_signing_secret_param")]
    pub signing_secret_param: String,

    #[serde(default = "default_encryption_key_param")]
    pub encryption_key_param: String,

    #[serde(default = "default_client_id_param")]
    pub client_id_param: String,

    #[serde(default = "default_client_secret_param")]
    pub client_secret_param: String,
}

fn default_signing_secret_param() -> String {
    "/a3s/webhook/signing-secret".to_string()
}

fn default_encryption_key_param() -> String {
    "/a3s/webhook/encryption-key".to_string()
}

fn default_client_id_param() -> String {
    "/a3s/webhook/client-id".to_string()
}

fn default_client_secret_param() -> String {
    "/a3s/webhook/client-secret".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            signing_secret_param: default_signing_secret_param(),
            encryption_key_param: default_encryption_key_param(),
            client_id_param: default_client_id_param(),
            client_secret_param: default_client_secret_param(),
        }
    }
}

/// Which bus backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    #[default]
    Memory,
    Nats,
}

/// Message bus settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub provider: BusBackend,

    #[serde(default)]
    pub nats: NatsConfig,

    #[serde(default)]
    pub topics: TopicConfig,
}

/// Topic names per routing category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    #[serde(default = "default_channel_topic")]
    pub channel_events: String,

    #[serde(default = "default_user_topic")]
    pub user_events: String,
}

fn default_channel_topic() -> String {
    "channel-events".to_string()
}

fn default_user_topic() -> String {
    "user-events".to_string()
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            channel_events: default_channel_topic(),
            user_events: default_user_topic(),
        }
    }
}

/// Which credential store backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

/// Durable store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// JSON file used by the file backend
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("a3s-webhook-credentials.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

/// I/O timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_short_timeout")]
    pub secret_secs: u64,

    #[serde(default = "default_short_timeout")]
    pub store_secs: u64,

    #[serde(default = "default_short_timeout")]
    pub publish_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_secs: u64,
}

fn default_short_timeout() -> u64 {
    3
}

fn default_http_timeout() -> u64 {
    3
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            secret_secs: default_short_timeout(),
            store_secs: default_short_timeout(),
            publish_secs: default_short_timeout(),
            http_secs: default_http_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn secret(&self) -> Duration {
        Duration::from_secs(self.secret_secs)
    }

    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_secs)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_secs(self.publish_secs)
    }

    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_secs)
    }
}

/// OAuth install settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Public domain serving `/slack/oauth/redirect`
    #[serde(default = "default_domain")]
    pub domain: String,
}

fn default_domain() -> String {
    "localhost".to_string()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
        }
    }
}

impl OAuthConfig {
    /// Redirect URI registered with the platform
    pub fn redirect_uri(&self) -> String {
        format!("https://{}/slack/oauth/redirect", self.domain)
    }
}

impl WebhookConfig {
    /// Load configuration from a TOML file.
    /// Returns default config if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            WebhookError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| WebhookError::Config(e.to_string()))
    }

    /// Returns the server bind address string (e.g., "127.0.0.1:3000").
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Copy that is safe to print: inline credentials are masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bus.nats.token.is_some() {
            config.bus.nats.token = Some(REDACTED.to_string());
        }
        config
    }
}

const REDACTED: &str = "<redacted>";
