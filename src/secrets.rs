//! Secure parameter store abstraction
//!
//! Signing secrets, OAuth client credentials, and the vault key are looked up
//! by name. Production deployments plug in a managed parameter store; the
//! environment-backed store covers local runs.

use crate::error::{Result, WebhookError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Key-value lookup of named parameters, optionally decrypted on read
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a parameter by name
    async fn get_parameter(&self, name: &str, decrypt: bool) -> Result<String>;
}

/// Fetch a parameter, failing with a retryable timeout after `timeout`
pub async fn get_parameter_with_timeout(
    store: &dyn SecretStore,
    name: &str,
    decrypt: bool,
    timeout: Duration,
) -> Result<String> {
    tokio::time::timeout(timeout, store.get_parameter(name, decrypt))
        .await
        .map_err(|_| {
            WebhookError::Timeout(format!(
                "Parameter '{}' lookup timed out after {:?}",
                name, timeout
            ))
        })?
}

/// Reads parameters from environment variables
///
/// `/a3s/webhook/signing-secret` resolves to `A3S_WEBHOOK_SIGNING_SECRET`.
/// Values are stored in plaintext, so `decrypt` is ignored.
#[derive(Debug, Default, Clone)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    /// Environment variable name for a parameter name
    pub fn env_key(name: &str) -> String {
        name.trim_matches('/')
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_parameter(&self, name: &str, _decrypt: bool) -> Result<String> {
        let key = Self::env_key(name);
        std::env::var(&key).map_err(|e| WebhookError::SecretStore {
            name: name.to_string(),
            reason: format!("{}: {}", key, e),
        })
    }
}

/// In-memory parameter store for testing
#[derive(Debug, Default, Clone)]
pub struct MemorySecretStore {
    values: Arc<HashMap<String, String>>,
}

impl MemorySecretStore {
    /// Create a store holding the given parameters
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: Arc::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_parameter(&self, name: &str, _decrypt: bool) -> Result<String> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| WebhookError::SecretStore {
                name: name.to_string(),
                reason: "parameter not found".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key_mapping() {
        assert_eq!(
            EnvSecretStore::env_key("/a3s/webhook/signing-secret"),
            "A3S_WEBHOOK_SIGNING_SECRET"
        );
        assert_eq!(EnvSecretStore::env_key("client_id"), "CLIENT_ID");
    }

    #[tokio::test]
    async fn test_env_store_reads_variable() {
        std::env::set_var("A3S_WEBHOOK_TEST_PARAM_READ", "hunter2");
        let store = EnvSecretStore;
        let value = store
            .get_parameter("/a3s/webhook/test-param-read", true)
            .await
            .unwrap();
        assert_eq!(value, "hunter2");
        std::env::remove_var("A3S_WEBHOOK_TEST_PARAM_READ");
    }

    #[tokio::test]
    async fn test_env_store_missing_variable() {
        let store = EnvSecretStore;
        let err = store
            .get_parameter("/a3s/webhook/definitely-unset-param", false)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::SecretStore { .. }));
    }

    #[tokio::test]
    async fn test_memory_store_lookup() {
        let store = MemorySecretStore::new([("signing", "s3cr3t")]);
        assert_eq!(store.get_parameter("signing", true).await.unwrap(), "s3cr3t");
        assert!(store.get_parameter("other", true).await.is_err());
    }

    struct SlowStore;

    #[async_trait]
    impl SecretStore for SlowStore {
        async fn get_parameter(&self, _name: &str, _decrypt: bool) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_lookup_timeout_is_retryable() {
        let err = get_parameter_with_timeout(&SlowStore, "slow", false, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Timeout(_)));
        assert!(err.is_retryable());
    }
}
