//! In-memory bus provider for single-process use and testing
//!
//! Keeps a bounded history per process and fans messages out to live
//! subscribers through broadcast channels. Nothing survives a restart.

use super::{BusProvider, PendingMessage, Subscription};
use crate::error::Result;
use crate::types::{BusMessage, DeliveryAck};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Configuration for the in-memory provider
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum messages kept in history (0 = unbounded)
    pub max_history: usize,

    /// Per-topic broadcast buffer
    pub channel_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: 10_000,
            channel_capacity: 1_024,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    sequence: u64,
    history: Vec<BusMessage>,
    channels: HashMap<String, broadcast::Sender<BusMessage>>,
}

/// In-memory bus provider
#[derive(Clone, Default)]
pub struct MemoryProvider {
    config: MemoryConfig,
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryProvider {
    /// Create a provider with the given configuration
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    /// Most recent messages, newest last, optionally filtered by topic
    pub async fn history(&self, topic: Option<&str>, limit: usize) -> Vec<BusMessage> {
        let state = self.state.read().await;
        let matching: Vec<&BusMessage> = state
            .history
            .iter()
            .filter(|m| topic.map_or(true, |t| m.topic == t))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    fn sender_for(&self, state: &mut MemoryState, topic: &str) -> broadcast::Sender<BusMessage> {
        state
            .channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.config.channel_capacity.max(1)).0)
            .clone()
    }
}

#[async_trait]
impl BusProvider for MemoryProvider {
    async fn publish(&self, topic: &str, body: &str) -> Result<DeliveryAck> {
        let mut state = self.state.write().await;
        state.sequence += 1;

        let mut message = BusMessage::new(topic, body);
        message.sequence = state.sequence;

        state.history.push(message.clone());
        if self.config.max_history > 0 && state.history.len() > self.config.max_history {
            let drain_count = state.history.len() - self.config.max_history;
            state.history.drain(..drain_count);
        }

        // No live subscribers is not an error; history still has the message
        let sender = self.sender_for(&mut state, topic);
        let _ = sender.send(message.clone());

        tracing::debug!(
            message_id = %message.id,
            topic = %topic,
            sequence = message.sequence,
            "Message published"
        );

        Ok(DeliveryAck {
            message_id: message.id,
            topic: topic.to_string(),
            sequence: message.sequence,
        })
    }

    async fn subscribe(&self, topic: &str, consumer: &str) -> Result<Box<dyn Subscription>> {
        let mut state = self.state.write().await;
        let receiver = self.sender_for(&mut state, topic).subscribe();

        tracing::info!(topic = %topic, consumer = %consumer, "Memory subscription created");

        Ok(Box::new(MemorySubscription {
            topic: topic.to_string(),
            stream: BroadcastStream::new(receiver),
            redeliveries: Arc::default(),
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Live subscription on the in-memory provider
///
/// A nak'd message is redelivered to this subscription before any new one.
pub struct MemorySubscription {
    topic: String,
    stream: BroadcastStream<BusMessage>,
    redeliveries: Arc<Mutex<VecDeque<(BusMessage, u32)>>>,
}

impl MemorySubscription {
    fn pending(&self, message: BusMessage, attempt: u32) -> PendingMessage {
        let redeliveries = self.redeliveries.clone();
        let retry = message.clone();
        PendingMessage::new(
            message,
            attempt,
            || async { Ok(()) }.boxed(),
            move || {
                async move {
                    redeliveries.lock().await.push_back((retry, attempt + 1));
                    Ok(())
                }
                .boxed()
            },
        )
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<PendingMessage>> {
        let redelivery = self.redeliveries.lock().await.pop_front();
        if let Some((message, attempt)) = redelivery {
            return Ok(Some(self.pending(message, attempt)));
        }

        loop {
            match self.stream.next().await {
                Some(Ok(message)) => return Ok(Some(self.pending(message, 1))),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(
                        topic = %self.topic,
                        skipped,
                        "Memory subscriber lagged; messages dropped"
                    );
                }
                None => return Ok(None),
            }
        }
    }
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
