//! Verified webhook event model
//!
//! String tags from the Events API (`type`, `event.type`, `event.subtype`) are
//! mapped onto closed enums with an explicit `Other` arm, so routing code
//! matches exhaustively instead of comparing strings.

use crate::error::{Result, WebhookError};
use crate::signature::VerifiedBody;
use serde_json::Value;
use std::fmt;

/// Top-level envelope `type`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeType {
    /// Endpoint handshake carrying a `challenge`
    UrlVerification,
    /// Wrapper around a workspace event
    EventCallback,
    /// Anything this service does not know
    Other(String),
}

impl From<&str> for EnvelopeType {
    fn from(tag: &str) -> Self {
        match tag {
            "url_verification" => EnvelopeType::UrlVerification,
            "event_callback" => EnvelopeType::EventCallback,
            other => EnvelopeType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeType::UrlVerification => f.write_str("url_verification"),
            EnvelopeType::EventCallback => f.write_str("event_callback"),
            EnvelopeType::Other(tag) => f.write_str(tag),
        }
    }
}

/// Nested `event.type` of a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackType {
    MemberJoinedChannel,
    AppMention,
    Message,
    Other(String),
}

impl From<&str> for CallbackType {
    fn from(tag: &str) -> Self {
        match tag {
            "member_joined_channel" => CallbackType::MemberJoinedChannel,
            "app_mention" => CallbackType::AppMention,
            "message" => CallbackType::Message,
            other => CallbackType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for CallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackType::MemberJoinedChannel => f.write_str("member_joined_channel"),
            CallbackType::AppMention => f.write_str("app_mention"),
            CallbackType::Message => f.write_str("message"),
            CallbackType::Other(tag) => f.write_str(tag),
        }
    }
}

/// Nested `event.subtype`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSubtype {
    /// Posted by a bot, including this one
    BotMessage,
    Other(String),
}

impl From<&str> for EventSubtype {
    fn from(tag: &str) -> Self {
        match tag {
            "bot_message" => EventSubtype::BotMessage,
            other => EventSubtype::Other(other.to_string()),
        }
    }
}

/// The workspace event inside an `event_callback`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub kind: CallbackType,
    pub subtype: Option<EventSubtype>,
    pub team: Option<String>,
    pub channel: Option<String>,
    pub user: Option<String>,
    pub text: Option<String>,
}

impl CallbackEvent {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            kind: CallbackType::from(str_field(value, "type").unwrap_or_default()),
            subtype: str_field(value, "subtype").map(EventSubtype::from),
            team: owned_str(obj.get("team")),
            channel: owned_str(obj.get("channel")),
            user: owned_str(obj.get("user")),
            text: owned_str(obj.get("text")),
        })
    }

    /// True when the event was produced by a bot
    pub fn is_bot_message(&self) -> bool {
        matches!(self.subtype, Some(EventSubtype::BotMessage))
    }
}

/// An event whose request passed signature verification
///
/// `raw` keeps the full payload so consumers get every field, not a summary.
/// Outside this crate the only constructor is `parse`, which takes a
/// `VerifiedBody`:
///
/// ```compile_fail
/// use a3s_webhook::event::VerifiedEvent;
///
/// let forged = VerifiedEvent::from_bus_message(r#"{"type":"event_callback"}"#);
/// ```
#[derive(Debug, Clone)]
pub struct VerifiedEvent {
    pub envelope: EnvelopeType,
    pub challenge: Option<String>,
    pub team_id: Option<String>,
    pub event_id: Option<String>,
    pub event: Option<CallbackEvent>,
    raw: Value,
}

impl VerifiedEvent {
    /// Parse a verified body
    pub fn parse(body: &VerifiedBody) -> Result<Self> {
        let raw: Value = serde_json::from_slice(body.as_bytes())
            .map_err(|e| WebhookError::MalformedEvent(format!("invalid JSON: {}", e)))?;
        Self::from_value(raw)
    }

    /// Rebuild from a payload that already travelled through the bus
    ///
    /// Bus messages are only produced from verified webhooks, so the crate's
    /// consumers read them back with this.
    pub(crate) fn from_bus_message(body: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(body)
            .map_err(|e| WebhookError::MalformedEvent(format!("invalid JSON: {}", e)))?;
        Self::from_value(raw)
    }

    fn from_value(raw: Value) -> Result<Self> {
        if !raw.is_object() {
            return Err(WebhookError::MalformedEvent(
                "payload is not a JSON object".to_string(),
            ));
        }
        let envelope = str_field(&raw, "type")
            .map(EnvelopeType::from)
            .ok_or_else(|| WebhookError::MalformedEvent("missing 'type' tag".to_string()))?;

        Ok(Self {
            envelope,
            challenge: str_field(&raw, "challenge").map(str::to_string),
            team_id: str_field(&raw, "team_id").map(str::to_string),
            event_id: str_field(&raw, "event_id").map(str::to_string),
            event: raw.get("event").and_then(CallbackEvent::from_value),
            raw,
        })
    }

    /// The full payload as received
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Workspace the event belongs to, preferring the nested event's team
    pub fn workspace_id(&self) -> Option<&str> {
        self.event
            .as_ref()
            .and_then(|e| e.team.as_deref())
            .or(self.team_id.as_deref())
    }

    /// Nested event type, for logging
    pub fn callback_type(&self) -> Option<&CallbackType> {
        self.event.as_ref().map(|e| &e.kind)
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn owned_str(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}
