//! NATS JetStream client: connect, publish, durable subscribe

use super::config::{NatsConfig, StorageType};
use crate::error::{Result, WebhookError};
use crate::provider::PendingMessage;
use crate::types::{BusMessage, DeliveryAck};
use async_nats::jetstream;
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::AckKind;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// NATS JetStream client
///
/// Owns the connection and makes sure the webhook stream exists.
pub struct NatsClient {
    /// NATS client connection
    client: async_nats::Client,

    /// JetStream context
    jetstream: jetstream::Context,

    /// JetStream stream handle (Mutex for methods requiring &mut self)
    stream: Mutex<jetstream::stream::Stream>,

    config: Arc<NatsConfig>,
}

impl NatsClient {
    /// Connect to NATS and initialize the JetStream stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let mut opts = async_nats::ConnectOptions::new()
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(ref token) = config.token {
            opts = opts.token(token.clone());
        }

        let client = opts
            .connect(&config.url)
            .await
            .map_err(|e| WebhookError::Connection(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, "Connected to NATS");

        let jetstream = jetstream::new(client.clone());
        let stream = ensure_stream(&jetstream, &config).await?;

        Ok(Self {
            client,
            jetstream,
            stream: Mutex::new(stream),
            config: Arc::new(config),
        })
    }

    /// Publish and wait for the JetStream ack
    pub async fn publish(&self, topic: &str, body: &str) -> Result<DeliveryAck> {
        let subject = self.config.subject_for(topic);
        let message_id = format!("msg-{}", uuid::Uuid::new_v4());

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", message_id.as_str());

        let ack = self
            .jetstream
            .publish_with_headers(subject.clone(), headers, body.to_string().into())
            .await
            .map_err(|e| WebhookError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?
            .await
            .map_err(|e| WebhookError::Publish {
                topic: topic.to_string(),
                reason: format!("ack failed: {}", e),
            })?;

        tracing::debug!(
            message_id = %message_id,
            subject = %subject,
            sequence = ack.sequence,
            "Message published"
        );

        Ok(DeliveryAck {
            message_id,
            topic: topic.to_string(),
            sequence: ack.sequence,
        })
    }

    /// Create (or resume) a durable pull consumer on a topic
    pub async fn subscribe(&self, topic: &str, consumer_name: &str) -> Result<NatsSubscription> {
        let subject = self.config.subject_for(topic);
        let durable = sanitize_consumer_name(consumer_name);

        let consumer = self
            .stream
            .lock()
            .await
            .get_or_create_consumer(
                &durable,
                pull::Config {
                    durable_name: Some(durable.clone()),
                    filter_subject: subject.clone(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: Duration::from_secs(self.config.ack_wait_secs),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| WebhookError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| WebhookError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(consumer = %durable, subject = %subject, "Durable subscription created");

        Ok(NatsSubscription {
            topic: topic.to_string(),
            messages,
            redeliver_delay: Duration::from_secs(self.config.redeliver_delay_secs),
        })
    }

    /// Whether the underlying connection is up
    pub fn is_connected(&self) -> bool {
        matches!(
            self.client.connection_state(),
            async_nats::connection::State::Connected
        )
    }

    /// Get the configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

/// Durable pull subscription
pub struct NatsSubscription {
    topic: String,
    messages: pull::Stream,
    redeliver_delay: Duration,
}

impl NatsSubscription {
    /// Receive the next message, leaving it unacknowledged
    pub async fn next_message(&mut self) -> Result<Option<PendingMessage>> {
        let Some(next) = self.messages.next().await else {
            return Ok(None);
        };
        let message = next.map_err(|e| WebhookError::Subscribe {
            topic: self.topic.clone(),
            reason: e.to_string(),
        })?;

        // Invalid UTF-8 surfaces as a malformed event in the handler
        let body = String::from_utf8_lossy(&message.payload).into_owned();
        let id = message
            .headers
            .as_ref()
            .and_then(|h| h.get("Nats-Msg-Id"))
            .map(|v| v.as_str().to_string())
            .unwrap_or_else(|| format!("msg-{}", uuid::Uuid::new_v4()));
        let (sequence, attempt) = message
            .info()
            .map(|i| (i.stream_sequence, u32::try_from(i.delivered).unwrap_or(1)))
            .unwrap_or((0, 1));

        let received = BusMessage {
            id,
            topic: self.topic.clone(),
            body,
            sequence,
            timestamp: crate::types::now_millis(),
        };

        let ack_msg = message.clone();
        let ack_topic = self.topic.clone();
        let nak_topic = self.topic.clone();
        let delay = self.redeliver_delay;

        Ok(Some(PendingMessage::new(
            received,
            attempt.max(1),
            move || {
                async move {
                    ack_msg.ack().await.map_err(|e| WebhookError::Subscribe {
                        topic: ack_topic,
                        reason: format!("ack failed: {}", e),
                    })
                }
                .boxed()
            },
            move || {
                async move {
                    message
                        .ack_with(AckKind::Nak(Some(delay)))
                        .await
                        .map_err(|e| WebhookError::Subscribe {
                            topic: nak_topic,
                            reason: format!("nak failed: {}", e),
                        })
                }
                .boxed()
            },
        )))
    }
}

async fn ensure_stream(
    jetstream: &jetstream::Context,
    config: &NatsConfig,
) -> Result<jetstream::stream::Stream> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: vec![config.stream_subjects()],
        storage,
        max_age: Duration::from_secs(config.max_age_secs),
        ..Default::default()
    };

    let stream = jetstream
        .get_or_create_stream(stream_config)
        .await
        .map_err(|e| WebhookError::Connection(format!(
            "Failed to create stream '{}': {}",
            config.stream_name, e
        )))?;

    tracing::info!(stream = %config.stream_name, "JetStream stream ready");
    Ok(stream)
}

/// Durable names may not contain `.`, `*`, `>` or whitespace
fn sanitize_consumer_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '.' | '*' | '>' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect()
}
