//! Outbound chat messages

use crate::error::{Result, WebhookError};
use crate::oauth::http_error;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Sends a message into a channel on behalf of a workspace's bot
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn post_message(&self, channel: &str, text: &str, token: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ChatApiResponse {
    #[serde(default)]
    ok: bool,
    error: Option<String>,
}

/// `chat.postMessage` client
pub struct ChatApiMessenger {
    http: reqwest::Client,
    api_base: String,
}

impl ChatApiMessenger {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebhookError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point the client at a different API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Messenger for ChatApiMessenger {
    async fn post_message(&self, channel: &str, text: &str, token: &str) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let payload = serde_json::json!({
            "channel": channel,
            "text": text,
            "link_names": true,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        let result: ChatApiResponse = response.json().await.map_err(http_error)?;
        tracing::debug!(channel = %channel, status = %status, ok = result.ok, "Chat API response");

        if !result.ok {
            return Err(WebhookError::Http(format!(
                "chat.postMessage failed: {}",
                result.error.unwrap_or_else(|| "unknown".to_string())
            )));
        }
        Ok(())
    }
}

/// Messenger that records messages instead of sending them
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    sent: tokio::sync::Mutex<Vec<(String, String)>>,
}

impl RecordingMessenger {
    /// `(channel, text)` pairs sent so far
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn post_message(&self, channel: &str, text: &str, _token: &str) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}
