//! NATS provider configuration

use serde::{Deserialize, Serialize};

/// JetStream storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    File,
    Memory,
}

/// Connection and stream settings for the NATS provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct NatsConfig {
    /// Server URL
    pub url: String,

    /// Optional auth token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// JetStream stream holding all webhook topics
    pub stream_name: String,

    /// Subject prefix; topic `user-events` maps to `<prefix>.user-events`
    pub subject_prefix: String,

    /// Storage backend for the stream
    pub storage: StorageType,

    /// Retention in seconds (0 = unlimited)
    pub max_age_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Seconds an unacknowledged message waits before redelivery
    pub ack_wait_secs: u64,

    /// Delay before a nak'd message is redelivered
    pub redeliver_delay_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            token: None,
            stream_name: "A3S_WEBHOOK".to_string(),
            subject_prefix: "webhook".to_string(),
            storage: StorageType::File,
            max_age_secs: 7 * 24 * 3600,
            connect_timeout_secs: 5,
            ack_wait_secs: 30,
            redeliver_delay_secs: 5,
        }
    }
}

impl NatsConfig {
    /// Subject for a topic
    pub fn subject_for(&self, topic: &str) -> String {
        format!("{}.{}", self.subject_prefix, topic)
    }

    /// Wildcard covering every topic of this provider
    pub fn stream_subjects(&self) -> String {
        format!("{}.>", self.subject_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_mapping() {
        let config = NatsConfig::default();
        assert_eq!(config.subject_for("user-events"), "webhook.user-events");
        assert_eq!(config.stream_subjects(), "webhook.>");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: NatsConfig = toml::from_str(
            r#"
            url = "nats://bus:4222"
            storage = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.url, "nats://bus:4222");
        assert_eq!(config.storage, StorageType::Memory);
        assert_eq!(config.stream_name, "A3S_WEBHOOK");
        assert_eq!(config.ack_wait_secs, 30);
        assert_eq!(config.redeliver_delay_secs, 5);
    }
}
