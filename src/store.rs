//! Durable credential store
//!
//! Workspace records are keyed by team id; channel bindings by
//! `(team_id, channel_id)`. Secret fields arrive already sealed by the
//! vault, so backends only ever see ciphertext.

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{Result, WebhookError};
use crate::types::{ChannelBinding, ChannelCredentials, ChannelKey, Workspace};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Result of a conditional channel insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The binding was written
    Inserted(ChannelBinding),
    /// A binding already existed and was left untouched
    Existing(ChannelBinding),
}

/// Key-value persistence for workspaces and channel bindings
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_workspace(&self, team_id: &str) -> Result<Option<Workspace>>;

    /// Insert or replace the workspace keyed by `team_id`
    async fn upsert_workspace(&self, workspace: Workspace) -> Result<()>;

    async fn get_channel(&self, key: &ChannelKey) -> Result<Option<ChannelBinding>>;

    /// Write `binding` only if its key is free
    ///
    /// Must be atomic with respect to concurrent inserts of the same key.
    async fn insert_channel_if_absent(&self, binding: ChannelBinding) -> Result<InsertOutcome>;

    /// Replace the credentials of an existing binding
    ///
    /// The stored endpoint and `created_at` are always kept. Returns `None`
    /// and writes nothing when the key has no binding.
    async fn rotate_channel_credentials(
        &self,
        key: &ChannelKey,
        credentials: ChannelCredentials,
        reissued_at: DateTime<Utc>,
    ) -> Result<Option<ChannelBinding>>;
}

/// Open the configured credential store
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryCredentialStore::new()),
        StoreBackend::File => Arc::new(FileCredentialStore::open(&config.path).await?),
    };
    tracing::info!(backend = ?config.backend, "Credential store ready");
    Ok(store)
}

#[derive(Debug, Clone, Default)]
struct Records {
    workspaces: HashMap<String, Workspace>,
    channels: BTreeMap<ChannelKey, ChannelBinding>,
}

impl Records {
    fn insert_if_absent(&mut self, binding: ChannelBinding) -> InsertOutcome {
        match self.channels.get(&binding.key()) {
            Some(existing) => InsertOutcome::Existing(existing.clone()),
            None => {
                self.channels.insert(binding.key(), binding.clone());
                InsertOutcome::Inserted(binding)
            }
        }
    }

    fn rotate(
        &mut self,
        key: &ChannelKey,
        credentials: ChannelCredentials,
        reissued_at: DateTime<Utc>,
    ) -> Option<ChannelBinding> {
        let binding = self.channels.get_mut(key)?;
        binding.credentials = credentials;
        binding.reissued_at = Some(reissued_at);
        Some(binding.clone())
    }
}

/// On-disk layout of the file store
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedRecords {
    #[serde(default)]
    workspaces: Vec<Workspace>,
    #[serde(default)]
    channels: Vec<ChannelBinding>,
}

impl From<&Records> for PersistedRecords {
    fn from(records: &Records) -> Self {
        let mut workspaces: Vec<Workspace> = records.workspaces.values().cloned().collect();
        workspaces.sort_by(|a, b| a.team_id.cmp(&b.team_id));
        Self {
            workspaces,
            channels: records.channels.values().cloned().collect(),
        }
    }
}

impl From<PersistedRecords> for Records {
    fn from(persisted: PersistedRecords) -> Self {
        Self {
            workspaces: persisted
                .workspaces
                .into_iter()
                .map(|w| (w.team_id.clone(), w))
                .collect(),
            channels: persisted
                .channels
                .into_iter()
                .map(|c| (c.key(), c))
                .collect(),
        }
    }
}

/// In-memory credential store for testing
///
/// Lost on drop.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<Records>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored channel bindings
    pub async fn channel_count(&self) -> usize {
        self.records.read().await.channels.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_workspace(&self, team_id: &str) -> Result<Option<Workspace>> {
        Ok(self.records.read().await.workspaces.get(team_id).cloned())
    }

    async fn upsert_workspace(&self, workspace: Workspace) -> Result<()> {
        self.records
            .write()
            .await
            .workspaces
            .insert(workspace.team_id.clone(), workspace);
        Ok(())
    }

    async fn get_channel(&self, key: &ChannelKey) -> Result<Option<ChannelBinding>> {
        Ok(self.records.read().await.channels.get(key).cloned())
    }

    async fn insert_channel_if_absent(&self, binding: ChannelBinding) -> Result<InsertOutcome> {
        Ok(self.records.write().await.insert_if_absent(binding))
    }

    async fn rotate_channel_credentials(
        &self,
        key: &ChannelKey,
        credentials: ChannelCredentials,
        reissued_at: DateTime<Utc>,
    ) -> Result<Option<ChannelBinding>> {
        Ok(self
            .records
            .write()
            .await
            .rotate(key, credentials, reissued_at))
    }
}

/// JSON file-backed credential store
///
/// Every write persists the whole record set. Atomic writes via temp file +
/// rename; the in-memory view only changes once the file is replaced. Each
/// write runs to completion on its own task, so a caller that stops waiting
/// cannot leave the file and the in-memory view apart.
pub struct FileCredentialStore {
    path: Arc<PathBuf>,
    records: Arc<Mutex<Records>>,
}

impl FileCredentialStore {
    /// Open the store, loading existing records if the file exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let json = tokio::fs::read_to_string(&path).await.map_err(|e| {
                WebhookError::Store(format!(
                    "Failed to read store file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let persisted: PersistedRecords = serde_json::from_str(&json).map_err(|e| {
                WebhookError::Store(format!(
                    "Failed to parse store file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Records::from(persisted)
        } else {
            Records::default()
        };

        tracing::debug!(
            path = %path.display(),
            workspaces = records.workspaces.len(),
            channels = records.channels.len(),
            "Credential store loaded"
        );

        Ok(Self {
            path: Arc::new(path),
            records: Arc::new(Mutex::new(records)),
        })
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy, persist it, then commit
    async fn update<T, F>(&self, change: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Records) -> T + Send + 'static,
    {
        let records = self.records.clone();
        let path = self.path.clone();
        tokio::spawn(async move {
            let mut records = records.lock().await;
            let mut next = records.clone();
            let out = change(&mut next);
            persist(&path, &next).await?;
            *records = next;
            Ok(out)
        })
        .await
        .map_err(|e| WebhookError::Store(format!("Store write task failed: {}", e)))?
    }
}

async fn persist(path: &Path, records: &Records) -> Result<()> {
    let json = serde_json::to_string_pretty(&PersistedRecords::from(records))?;
    let tmp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            WebhookError::Store(format!(
                "Failed to create store directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    tokio::fs::write(&tmp_path, json).await.map_err(|e| {
        WebhookError::Store(format!(
            "Failed to write store file {}: {}",
            tmp_path.display(),
            e
        ))
    })?;

    tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
        WebhookError::Store(format!(
            "Failed to rename store file {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        ))
    })?;

    tracing::debug!(path = %path.display(), "Credential store saved");
    Ok(())
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get_workspace(&self, team_id: &str) -> Result<Option<Workspace>> {
        Ok(self.records.lock().await.workspaces.get(team_id).cloned())
    }

    async fn upsert_workspace(&self, workspace: Workspace) -> Result<()> {
        self.update(move |r| {
            r.workspaces.insert(workspace.team_id.clone(), workspace);
        })
        .await
    }

    async fn get_channel(&self, key: &ChannelKey) -> Result<Option<ChannelBinding>> {
        Ok(self.records.lock().await.channels.get(key).cloned())
    }

    async fn insert_channel_if_absent(&self, binding: ChannelBinding) -> Result<InsertOutcome> {
        {
            let records = self.records.lock().await;
            if let Some(existing) = records.channels.get(&binding.key()) {
                return Ok(InsertOutcome::Existing(existing.clone()));
            }
        }
        self.update(move |r| r.insert_if_absent(binding)).await
    }

    async fn rotate_channel_credentials(
        &self,
        key: &ChannelKey,
        credentials: ChannelCredentials,
        reissued_at: DateTime<Utc>,
    ) -> Result<Option<ChannelBinding>> {
        if !self.records.lock().await.channels.contains_key(key) {
            return Ok(None);
        }
        let key = key.clone();
        self.update(move |r| r.rotate(&key, credentials, reissued_at))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptedSecret;
    use std::time::Duration;

    fn sealed(tag: &str) -> EncryptedSecret {
        EncryptedSecret {
            key_id: "k-test".into(),
            nonce: "AAAAAAAAAAAAAAAA".into(),
            ciphertext: tag.into(),
        }
    }

    fn binding(team: &str, channel: &str, endpoint: &str) -> ChannelBinding {
        ChannelBinding {
            team_id: team.into(),
            channel_id: channel.into(),
            endpoint: endpoint.into(),
            credentials: ChannelCredentials {
                username: "0011223344556677".into(),
                password: sealed(endpoint),
            },
            created_at: Utc::now(),
            reissued_at: None,
        }
    }

    fn workspace(team: &str, name: &str) -> Workspace {
        Workspace {
            team_id: team.into(),
            team_name: name.into(),
            access_token: sealed("user"),
            bot_user_id: "UBOT".into(),
            bot_access_token: sealed("bot"),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_insert_if_absent_keeps_first() {
        let store = MemoryCredentialStore::new();
        let first = store
            .insert_channel_if_absent(binding("T1", "C1", "ep-1"))
            .await
            .unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let second = store
            .insert_channel_if_absent(binding("T1", "C1", "ep-2"))
            .await
            .unwrap();
        match second {
            InsertOutcome::Existing(b) => assert_eq!(b.endpoint, "ep-1"),
            other => panic!("expected existing binding, got {:?}", other),
        }
        assert_eq!(store.channel_count().await, 1);
    }

    #[tokio::test]
    async fn test_memory_workspace_upsert_last_write_wins() {
        let store = MemoryCredentialStore::new();
        store.upsert_workspace(workspace("T1", "Old")).await.unwrap();
        store.upsert_workspace(workspace("T1", "New")).await.unwrap();

        let ws = store.get_workspace("T1").await.unwrap().unwrap();
        assert_eq!(ws.team_name, "New");
        assert!(store.get_workspace("T2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_keeps_endpoint_and_creation_time() {
        let store = MemoryCredentialStore::new();
        let original = binding("T1", "C1", "ep-1");
        store.insert_channel_if_absent(original.clone()).await.unwrap();

        let fresh = ChannelCredentials {
            username: "8899aabbccddeeff".into(),
            password: sealed("rotated"),
        };
        let at = Utc::now();
        let rotated = store
            .rotate_channel_credentials(&original.key(), fresh.clone(), at)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(rotated.endpoint, "ep-1");
        assert_eq!(rotated.created_at, original.created_at);
        assert_eq!(rotated.credentials, fresh);
        assert_eq!(rotated.reissued_at, Some(at));
        assert_eq!(
            store.get_channel(&original.key()).await.unwrap(),
            Some(rotated)
        );
    }

    #[tokio::test]
    async fn test_rotate_unknown_channel_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = FileCredentialStore::open(&path).await.unwrap();

        let key = ChannelKey::new("T1", "C1");
        let rotated = store
            .rotate_channel_credentials(&key, binding("T1", "C1", "x").credentials, Utc::now())
            .await
            .unwrap();
        assert!(rotated.is_none());
        assert!(store.get_channel(&key).await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");

        {
            let store = FileCredentialStore::open(&path).await.unwrap();
            store.upsert_workspace(workspace("T1", "Acme")).await.unwrap();
            store
                .insert_channel_if_absent(binding("T1", "C1", "ep-1"))
                .await
                .unwrap();
        }

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        let ws = reopened.get_workspace("T1").await.unwrap().unwrap();
        assert_eq!(ws.team_name, "Acme");
        assert_eq!(ws.bot_access_token, sealed("bot"));

        let ch = reopened
            .get_channel(&ChannelKey::new("T1", "C1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ch.endpoint, "ep-1");
    }

    #[tokio::test]
    async fn test_file_store_never_writes_plaintext_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = FileCredentialStore::open(&path).await.unwrap();
        store.upsert_workspace(workspace("T1", "Acme")).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let token = &json["workspaces"][0]["botAccessToken"];
        assert_eq!(token["keyId"], "k-test");
        assert_eq!(token["ciphertext"], "bot");
    }

    #[tokio::test]
    async fn test_file_store_no_tmp_file_left() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = FileCredentialStore::open(&path).await.unwrap();
        store
            .insert_channel_if_absent(binding("T1", "C1", "ep-1"))
            .await
            .unwrap();
        store
            .rotate_channel_credentials(
                &ChannelKey::new("T1", "C1"),
                binding("T1", "C1", "ep-2").credentials,
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileCredentialStore::open(&path).await.err().unwrap();
        assert!(matches!(err, WebhookError::Store(_)));
    }

    #[tokio::test]
    async fn test_file_store_failed_write_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let store = FileCredentialStore::open(blocker.join("creds.json"))
            .await
            .unwrap();
        let err = store
            .insert_channel_if_absent(binding("T1", "C1", "ep-1"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store
            .get_channel(&ChannelKey::new("T1", "C1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_abandoned_write_still_commits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = FileCredentialStore::open(&path).await.unwrap();
        let key = ChannelKey::new("T1", "C1");

        let abandoned = tokio::time::timeout(
            Duration::ZERO,
            store.insert_channel_if_absent(binding("T1", "C1", "ep-1")),
        )
        .await;
        assert!(abandoned.is_err());

        let mut in_memory = None;
        for _ in 0..200 {
            in_memory = store.get_channel(&key).await.unwrap();
            if in_memory.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let in_memory = in_memory.expect("write was not committed");

        let on_disk = FileCredentialStore::open(&path)
            .await
            .unwrap()
            .get_channel(&key)
            .await
            .unwrap();
        assert_eq!(on_disk, Some(in_memory.clone()));

        let retried = store
            .insert_channel_if_absent(binding("T1", "C1", "ep-2"))
            .await
            .unwrap();
        assert_eq!(retried, InsertOutcome::Existing(in_memory));
    }
}
