//! OAuth install completion
//!
//! The platform redirects the installing user back with either `code` or
//! `error`. A code is exchanged for tokens at `oauth.access`, and the tokens
//! are sealed and stored before success is reported.

use crate::error::{Result, WebhookError};
use crate::provision::CredentialProvisioner;
use crate::types::Workspace;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Query parameters of the OAuth redirect
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Bot section of an `oauth.access` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotAccess {
    pub bot_user_id: String,
    pub bot_access_token: String,
}

/// `oauth.access` response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthAccessResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub bot: Option<BotAccess>,
}

/// Exchanges authorization codes for tokens
#[async_trait]
pub trait OAuthClient: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<OAuthAccessResponse>;
}

/// `oauth.access` client
pub struct SlackOAuthClient {
    http: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl SlackOAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebhookError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        })
    }

    /// Point the client at a different API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl OAuthClient for SlackOAuthClient {
    async fn exchange_code(&self, code: &str) -> Result<OAuthAccessResponse> {
        let url = format!("{}/oauth.access", self.api_base);
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_error)?;

        response.json::<OAuthAccessResponse>().await.map_err(http_error)
    }
}

/// Map a reqwest failure onto the retryable error variants
pub(crate) fn http_error(e: reqwest::Error) -> WebhookError {
    if e.is_timeout() {
        WebhookError::Timeout(e.to_string())
    } else {
        WebhookError::Http(e.to_string())
    }
}

/// Finish an install: validate the callback, exchange the code, store tokens
///
/// Only returns `Ok` once the workspace is persisted.
pub async fn complete_oauth(
    callback: &OAuthCallback,
    client: &dyn OAuthClient,
    provisioner: &CredentialProvisioner,
) -> Result<Workspace> {
    if let Some(error) = callback.error.as_deref().filter(|e| !e.is_empty()) {
        tracing::warn!(error = %error, "OAuth install was declined");
        return Err(WebhookError::OAuth(error.to_string()));
    }

    let code = callback
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| WebhookError::OAuth("missing code".to_string()))?;

    let access = client.exchange_code(code).await?;
    if !access.ok {
        let error = access
            .error
            .unwrap_or_else(|| "oauth.access failed".to_string());
        tracing::warn!(error = %error, "OAuth code exchange rejected");
        return Err(WebhookError::OAuth(error));
    }

    provisioner.save_workspace(&access).await
}
