//! Event classification
//!
//! Maps a verified event to exactly one routing decision. The bot-message
//! filter runs before any type-based routing so the bot never reacts to its
//! own output.

use crate::event::{CallbackType, EnvelopeType, VerifiedEvent};
use std::fmt;

/// Why an event was not routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Handshake without a challenge token
    MissingChallenge,
    /// Top-level `type` other than `url_verification`/`event_callback`
    UnsupportedTopLevelType(String),
    /// `event_callback` without a nested event object
    MissingCallbackEvent,
    /// Nested event type this service does not route
    UnsupportedCallbackType(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingChallenge => f.write_str("handshake without challenge"),
            RejectReason::UnsupportedTopLevelType(t) => {
                write!(f, "unsupported top-level type '{}'", t)
            }
            RejectReason::MissingCallbackEvent => f.write_str("callback without event"),
            RejectReason::UnsupportedCallbackType(t) => {
                write!(f, "unsupported callback type '{}'", t)
            }
        }
    }
}

/// Outcome of classifying one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Reply to the handshake with this token
    Challenge(String),
    /// Acknowledge and drop
    Filtered,
    /// Publish to the channel-events topic
    RouteToChannelTopic,
    /// Publish to the user-events topic
    RouteToUserTopic,
    /// Refuse the event
    Rejected(RejectReason),
}

impl RoutingDecision {
    /// Topic kind for routed decisions
    pub fn topic(&self) -> Option<TopicKind> {
        match self {
            RoutingDecision::RouteToChannelTopic => Some(TopicKind::Channel),
            RoutingDecision::RouteToUserTopic => Some(TopicKind::User),
            _ => None,
        }
    }

    /// Short label for logs and errors
    pub fn label(&self) -> &'static str {
        match self {
            RoutingDecision::Challenge(_) => "challenge",
            RoutingDecision::Filtered => "filtered",
            RoutingDecision::RouteToChannelTopic => "channel",
            RoutingDecision::RouteToUserTopic => "user",
            RoutingDecision::Rejected(_) => "rejected",
        }
    }
}

/// Logical bus topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Channel,
    User,
}

/// Classify a verified event
pub fn classify(event: &VerifiedEvent) -> RoutingDecision {
    if event.envelope == EnvelopeType::UrlVerification {
        return match &event.challenge {
            Some(token) => RoutingDecision::Challenge(token.clone()),
            None => RoutingDecision::Rejected(RejectReason::MissingChallenge),
        };
    }

    if event.event.as_ref().is_some_and(|e| e.is_bot_message()) {
        return RoutingDecision::Filtered;
    }

    if let EnvelopeType::Other(tag) = &event.envelope {
        return RoutingDecision::Rejected(RejectReason::UnsupportedTopLevelType(tag.clone()));
    }

    let Some(callback) = &event.event else {
        return RoutingDecision::Rejected(RejectReason::MissingCallbackEvent);
    };

    match &callback.kind {
        CallbackType::MemberJoinedChannel => RoutingDecision::RouteToChannelTopic,
        CallbackType::AppMention | CallbackType::Message => RoutingDecision::RouteToUserTopic,
        CallbackType::Other(tag) => {
            RoutingDecision::Rejected(RejectReason::UnsupportedCallbackType(tag.clone()))
        }
    }
}
