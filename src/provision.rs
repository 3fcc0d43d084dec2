//! Credential provisioning for workspaces and channels
//!
//! Secrets are sealed by the vault before they reach the store.
//!
//! Re-provisioning policy: `provision_channel` is idempotent and returns an
//! existing binding unchanged. Rotating credentials is a separate, explicit
//! call (`reissue_channel`) that keeps the endpoint.

use crate::crypto::CryptoVault;
use crate::error::{Result, WebhookError};
use crate::oauth::OAuthAccessResponse;
use crate::store::{CredentialStore, InsertOutcome};
use crate::types::{ChannelBinding, ChannelCredentials, ChannelKey, Workspace};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const USERNAME_BYTES: usize = 8;
const PASSWORD_BYTES: usize = 32;

/// Creates and stores encrypted workspace and channel credentials
#[derive(Clone)]
pub struct CredentialProvisioner {
    store: Arc<dyn CredentialStore>,
    vault: Arc<CryptoVault>,
    timeout: Duration,
}

impl CredentialProvisioner {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        vault: Arc<CryptoVault>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            vault,
            timeout,
        }
    }

    /// Provision a channel, or return the binding it already has
    pub async fn provision_channel(
        &self,
        team_id: &str,
        channel_id: &str,
    ) -> Result<ChannelBinding> {
        let key = ChannelKey::new(team_id, channel_id);

        let existing = self
            .with_timeout("get channel", self.store.get_channel(&key))
            .await?;
        if let Some(existing) = existing {
            tracing::debug!(channel = %key, "Channel already provisioned");
            return Ok(existing);
        }

        let binding = ChannelBinding {
            team_id: team_id.to_string(),
            channel_id: channel_id.to_string(),
            endpoint: new_endpoint(),
            credentials: self.new_credentials()?,
            created_at: Utc::now(),
            reissued_at: None,
        };

        match self
            .with_timeout("insert channel", self.store.insert_channel_if_absent(binding))
            .await?
        {
            InsertOutcome::Inserted(binding) => {
                tracing::info!(channel = %key, endpoint = %binding.endpoint, "Channel provisioned");
                Ok(binding)
            }
            InsertOutcome::Existing(binding) => {
                tracing::debug!(channel = %key, "Lost provisioning race; using stored binding");
                Ok(binding)
            }
        }
    }

    /// Rotate a channel's credentials
    ///
    /// The store swaps the credentials in place, so the endpoint of an
    /// existing binding survives whatever this process last read. A channel
    /// that was never provisioned is provisioned instead.
    pub async fn reissue_channel(
        &self,
        team_id: &str,
        channel_id: &str,
    ) -> Result<ChannelBinding> {
        let key = ChannelKey::new(team_id, channel_id);
        let credentials = self.new_credentials()?;

        let rotated = self
            .with_timeout(
                "rotate channel",
                self.store.rotate_channel_credentials(&key, credentials, Utc::now()),
            )
            .await?;

        match rotated {
            Some(binding) => {
                tracing::info!(channel = %key, "Channel credentials reissued");
                Ok(binding)
            }
            None => self.provision_channel(team_id, channel_id).await,
        }
    }

    /// Seal and store the tokens from a successful OAuth exchange
    pub async fn save_workspace(&self, access: &OAuthAccessResponse) -> Result<Workspace> {
        let team_id = required(&access.team_id, "team_id")?;
        let access_token = required(&access.access_token, "access_token")?;
        let bot = access
            .bot
            .as_ref()
            .ok_or_else(|| WebhookError::OAuth("missing bot".to_string()))?;

        let workspace = Workspace {
            team_id: team_id.to_string(),
            team_name: access.team_name.clone().unwrap_or_default(),
            access_token: self.vault.encrypt_str(access_token)?,
            bot_user_id: bot.bot_user_id.clone(),
            bot_access_token: self.vault.encrypt_str(&bot.bot_access_token)?,
            updated_at: Utc::now(),
        };

        self.with_timeout("upsert workspace", self.store.upsert_workspace(workspace.clone()))
            .await?;
        tracing::info!(team_id = %workspace.team_id, "Workspace saved");
        Ok(workspace)
    }

    /// Decrypted bot token of a workspace, if the workspace is known
    pub async fn workspace_bot_token(&self, team_id: &str) -> Result<Option<String>> {
        let Some(workspace) = self
            .with_timeout("get workspace", self.store.get_workspace(team_id))
            .await?
        else {
            return Ok(None);
        };
        self.vault
            .decrypt_string(&workspace.bot_access_token)
            .map(Some)
    }

    fn new_credentials(&self) -> Result<ChannelCredentials> {
        let mut username = [0u8; USERNAME_BYTES];
        OsRng.fill_bytes(&mut username);

        let mut password = [0u8; PASSWORD_BYTES];
        OsRng.fill_bytes(&mut password);

        Ok(ChannelCredentials {
            username: hex::encode(username),
            password: self.vault.encrypt_str(&URL_SAFE_NO_PAD.encode(password))?,
        })
    }

    async fn with_timeout<T>(
        &self,
        op: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            WebhookError::Timeout(format!("store {} after {:?}", op, self.timeout))
        })?
    }
}

/// Random UUID v4 endpoint id
fn new_endpoint() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str> {
    field
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WebhookError::OAuth(format!("missing {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Aes256GcmCipher;
    use crate::oauth::BotAccess;
    use crate::store::MemoryCredentialStore;
    use async_trait::async_trait;
    use chrono::DateTime;

    fn vault() -> Arc<CryptoVault> {
        Arc::new(CryptoVault::new(
            Aes256GcmCipher::new("k-test", &[0x11; 32]).unwrap(),
        ))
    }

    fn provisioner(store: Arc<dyn CredentialStore>) -> CredentialProvisioner {
        CredentialProvisioner::new(store, vault(), Duration::from_secs(1))
    }

    fn access() -> OAuthAccessResponse {
        OAuthAccessResponse {
            ok: true,
            error: None,
            team_id: Some("T1".into()),
            team_name: Some("Acme".into()),
            access_token: Some("xoxp-user".into()),
            bot: Some(BotAccess {
                bot_user_id: "UBOT".into(),
                bot_access_token: "xoxb-bot".into(),
            }),
        }
    }

    #[tokio::test]
    async fn test_provision_channel_generates_credentials() {
        let store = Arc::new(MemoryCredentialStore::new());
        let p = provisioner(store.clone());

        let binding = p.provision_channel("T1", "C1").await.unwrap();
        assert!(uuid::Uuid::parse_str(&binding.endpoint).is_ok());
        assert_eq!(binding.credentials.username.len(), USERNAME_BYTES * 2);
        assert!(binding.credentials.username.chars().all(|c| c.is_ascii_hexdigit()));

        let password = p.vault.decrypt_string(&binding.credentials.password).unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(&password).unwrap().len(), PASSWORD_BYTES);
        assert_ne!(binding.credentials.password.ciphertext, password);
    }

    #[tokio::test]
    async fn test_provision_channel_is_idempotent() {
        let store = Arc::new(MemoryCredentialStore::new());
        let p = provisioner(store.clone());

        let first = p.provision_channel("T1", "C1").await.unwrap();
        let second = p.provision_channel("T1", "C1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.channel_count().await, 1);

        let other = p.provision_channel("T1", "C2").await.unwrap();
        assert_ne!(other.endpoint, first.endpoint);
    }

    #[tokio::test]
    async fn test_concurrent_provisioning_converges() {
        let store = Arc::new(MemoryCredentialStore::new());
        let p = provisioner(store.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = p.clone();
                tokio::spawn(async move { p.provision_channel("T1", "C1").await.unwrap() })
            })
            .collect();

        let mut endpoints = Vec::new();
        for h in handles {
            endpoints.push(h.await.unwrap().endpoint);
        }
        endpoints.dedup();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(store.channel_count().await, 1);
    }

    #[tokio::test]
    async fn test_reissue_rotates_credentials_keeps_endpoint() {
        let store = Arc::new(MemoryCredentialStore::new());
        let p = provisioner(store.clone());

        let original = p.provision_channel("T1", "C1").await.unwrap();
        let reissued = p.reissue_channel("T1", "C1").await.unwrap();

        assert_eq!(reissued.endpoint, original.endpoint);
        assert_eq!(reissued.created_at, original.created_at);
        assert_ne!(reissued.credentials, original.credentials);
        assert!(reissued.reissued_at.is_some());

        let stored = p.provision_channel("T1", "C1").await.unwrap();
        assert_eq!(stored, reissued);
    }

    #[tokio::test]
    async fn test_reissue_unknown_channel_creates_binding() {
        let p = provisioner(Arc::new(MemoryCredentialStore::new()));
        let binding = p.reissue_channel("T1", "C9").await.unwrap();
        assert!(binding.reissued_at.is_none());
    }

    #[tokio::test]
    async fn test_save_workspace_encrypts_tokens() {
        let store = Arc::new(MemoryCredentialStore::new());
        let p = provisioner(store.clone());

        let ws = p.save_workspace(&access()).await.unwrap();
        assert_eq!(ws.team_name, "Acme");
        assert_ne!(ws.access_token.ciphertext, "xoxp-user");
        assert_eq!(p.vault.decrypt_string(&ws.access_token).unwrap(), "xoxp-user");

        let stored = store.get_workspace("T1").await.unwrap().unwrap();
        assert_eq!(stored, ws);
        assert_eq!(
            p.workspace_bot_token("T1").await.unwrap().as_deref(),
            Some("xoxb-bot")
        );
        assert!(p.workspace_bot_token("T404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_workspace_requires_team_and_bot() {
        let p = provisioner(Arc::new(MemoryCredentialStore::new()));

        let mut no_team = access();
        no_team.team_id = None;
        assert!(matches!(
            p.save_workspace(&no_team).await.unwrap_err(),
            WebhookError::OAuth(_)
        ));

        let mut no_bot = access();
        no_bot.bot = None;
        assert!(matches!(
            p.save_workspace(&no_bot).await.unwrap_err(),
            WebhookError::OAuth(_)
        ));
    }

    #[tokio::test]
    async fn test_bot_token_under_foreign_key_is_an_error() {
        let store = Arc::new(MemoryCredentialStore::new());
        let foreign = CryptoVault::new(Aes256GcmCipher::new("k-other", &[0x22; 32]).unwrap());
        store
            .upsert_workspace(Workspace {
                team_id: "T1".into(),
                team_name: "Acme".into(),
                access_token: foreign.encrypt_str("xoxp").unwrap(),
                bot_user_id: "UBOT".into(),
                bot_access_token: foreign.encrypt_str("xoxb").unwrap(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let p = provisioner(store);
        let err = p.workspace_bot_token("T1").await.unwrap_err();
        assert!(matches!(err, WebhookError::Decryption(_)));
    }

    struct DownStore;

    #[async_trait]
    impl CredentialStore for DownStore {
        async fn get_workspace(&self, _team_id: &str) -> Result<Option<Workspace>> {
            Err(WebhookError::Store("unreachable".into()))
        }

        async fn upsert_workspace(&self, _workspace: Workspace) -> Result<()> {
            Err(WebhookError::Store("unreachable".into()))
        }

        async fn get_channel(&self, _key: &ChannelKey) -> Result<Option<ChannelBinding>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn insert_channel_if_absent(
            &self,
            _binding: ChannelBinding,
        ) -> Result<InsertOutcome> {
            Err(WebhookError::Store("unreachable".into()))
        }

        async fn rotate_channel_credentials(
            &self,
            _key: &ChannelKey,
            _credentials: ChannelCredentials,
            _reissued_at: DateTime<Utc>,
        ) -> Result<Option<ChannelBinding>> {
            Err(WebhookError::Store("unreachable".into()))
        }
    }

    /// Shares `inner`, but every channel read comes back empty
    struct StaleReads {
        inner: Arc<MemoryCredentialStore>,
    }

    #[async_trait]
    impl CredentialStore for StaleReads {
        async fn get_workspace(&self, team_id: &str) -> Result<Option<Workspace>> {
            self.inner.get_workspace(team_id).await
        }

        async fn upsert_workspace(&self, workspace: Workspace) -> Result<()> {
            self.inner.upsert_workspace(workspace).await
        }

        async fn get_channel(&self, _key: &ChannelKey) -> Result<Option<ChannelBinding>> {
            Ok(None)
        }

        async fn insert_channel_if_absent(&self, binding: ChannelBinding) -> Result<InsertOutcome> {
            self.inner.insert_channel_if_absent(binding).await
        }

        async fn rotate_channel_credentials(
            &self,
            key: &ChannelKey,
            credentials: ChannelCredentials,
            reissued_at: DateTime<Utc>,
        ) -> Result<Option<ChannelBinding>> {
            self.inner
                .rotate_channel_credentials(key, credentials, reissued_at)
                .await
        }
    }

    #[tokio::test]
    async fn test_reissue_never_replaces_assigned_endpoint() {
        let inner = Arc::new(MemoryCredentialStore::new());
        let original = provisioner(inner.clone())
            .provision_channel("T1", "C1")
            .await
            .unwrap();

        let stale = provisioner(Arc::new(StaleReads {
            inner: inner.clone(),
        }));
        let reissued = stale.reissue_channel("T1", "C1").await.unwrap();
        assert_eq!(reissued.endpoint, original.endpoint);
        assert_ne!(reissued.credentials, original.credentials);

        // A provision racing on a stale read also keeps the stored endpoint
        let raced = stale.provision_channel("T1", "C1").await.unwrap();
        assert_eq!(raced.endpoint, original.endpoint);

        let stored = inner
            .get_channel(&ChannelKey::new("T1", "C1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.endpoint, original.endpoint);
        assert_eq!(stored.created_at, original.created_at);
        assert_eq!(inner.channel_count().await, 1);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let p = provisioner(Arc::new(DownStore));
        let err = p.save_workspace(&access()).await.unwrap_err();
        assert!(matches!(err, WebhookError::Store(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let p = provisioner(Arc::new(DownStore));
        let err = p.provision_channel("T1", "C1").await.unwrap_err();
        assert!(matches!(err, WebhookError::Timeout(_)));
    }
}
