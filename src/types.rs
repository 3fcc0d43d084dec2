//! Core record types for a3s-webhook
//!
//! All types use camelCase JSON serialization for wire compatibility.

use crate::crypto::EncryptedSecret;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message on the bus
///
/// `body` is the full verified webhook payload, string-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMessage {
    /// Unique message identifier (msg-<uuid>)
    pub id: String,

    /// Topic the message was published to
    pub topic: String,

    /// JSON payload
    pub body: String,

    /// Provider-assigned sequence number (0 until published)
    #[serde(default)]
    pub sequence: u64,

    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

impl BusMessage {
    /// Create a new message with auto-generated id and timestamp
    pub fn new(topic: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            topic: topic.into(),
            body: body.into(),
            sequence: 0,
            timestamp: now_millis(),
        }
    }
}

/// Confirmation that the bus accepted a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAck {
    /// Message identifier
    pub message_id: String,

    /// Topic the message landed on
    pub topic: String,

    /// Provider-assigned sequence number
    pub sequence: u64,
}

/// A workspace (team) connected through OAuth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    /// Workspace id, the record key
    pub team_id: String,

    /// Display name
    pub team_name: String,

    /// User-scoped access token
    pub access_token: EncryptedSecret,

    /// Bot user identity
    pub bot_user_id: String,

    /// Bot access token used for outbound messages
    pub bot_access_token: EncryptedSecret,

    /// Last successful OAuth completion
    pub updated_at: DateTime<Utc>,
}

/// Generated credentials nested in a channel binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCredentials {
    /// Non-secret display/audit name
    pub username: String,

    /// Secret, sealed by the vault
    pub password: EncryptedSecret,
}

/// Per-channel provisioned endpoint and credential pair
///
/// Keyed by `(team_id, channel_id)`. The endpoint never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelBinding {
    pub team_id: String,

    pub channel_id: String,

    /// Opaque endpoint identifier (UUID v4)
    pub endpoint: String,

    pub credentials: ChannelCredentials,

    pub created_at: DateTime<Utc>,

    /// Set when credentials were explicitly re-issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reissued_at: Option<DateTime<Utc>>,
}

impl ChannelBinding {
    /// Composite store key
    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(&self.team_id, &self.channel_id)
    }
}

/// Composite key of a channel binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelKey {
    pub team_id: String,
    pub channel_id: String,
}

impl ChannelKey {
    pub fn new(team_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.team_id, self.channel_id)
    }
}

/// Current time in Unix milliseconds
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
