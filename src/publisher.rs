//! Forward routed events to their bus topic

use crate::classify::{RoutingDecision, TopicKind};
use crate::config::TopicConfig;
use crate::error::{Result, WebhookError};
use crate::event::VerifiedEvent;
use crate::provider::BusProvider;
use crate::types::DeliveryAck;
use std::sync::Arc;
use std::time::Duration;

/// Publishes the full verified payload of routed events
///
/// Failures are returned, never swallowed: the webhook handler turns them
/// into a retryable response so the platform re-delivers.
#[derive(Clone)]
pub struct EventPublisher {
    provider: Arc<dyn BusProvider>,
    topics: TopicConfig,
    timeout: Duration,
}

impl EventPublisher {
    pub fn new(provider: Arc<dyn BusProvider>, topics: TopicConfig, timeout: Duration) -> Self {
        Self {
            provider,
            topics,
            timeout,
        }
    }

    /// Topic name for a routing category
    pub fn topic_for(&self, kind: TopicKind) -> &str {
        match kind {
            TopicKind::Channel => &self.topics.channel_events,
            TopicKind::User => &self.topics.user_events,
        }
    }

    /// Publish `event` to the topic selected by `decision`
    pub async fn publish(
        &self,
        event: &VerifiedEvent,
        decision: &RoutingDecision,
    ) -> Result<DeliveryAck> {
        let kind = decision
            .topic()
            .ok_or_else(|| WebhookError::NotRoutable(decision.label().to_string()))?;
        let topic = self.topic_for(kind);
        let body = serde_json::to_string(event.raw())?;

        let ack = tokio::time::timeout(self.timeout, self.provider.publish(topic, &body))
            .await
            .map_err(|_| {
                WebhookError::Timeout(format!(
                    "publish to '{}' via {} after {:?}",
                    topic,
                    self.provider.name(),
                    self.timeout
                ))
            })??;

        tracing::info!(
            topic = %topic,
            message_id = %ack.message_id,
            sequence = ack.sequence,
            event_id = ?event.event_id,
            "Event routed"
        );
        Ok(ack)
    }

    /// Name of the underlying bus provider
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Bus health, as reported by the provider
    pub async fn health(&self) -> Result<bool> {
        self.provider.health().await
    }
}
