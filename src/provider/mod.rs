//! Message bus provider trait
//!
//! Routed webhook events are published to topic-addressed queues through a
//! `BusProvider`. Backends (NATS JetStream, in-memory) implement it so the
//! webhook pipeline never depends on a concrete transport.

use crate::config::{BusBackend, BusConfig};
use crate::error::Result;
use crate::types::{BusMessage, DeliveryAck};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

pub mod memory;
pub mod nats;

/// Core trait for bus backends
///
/// Delivery is at-least-once: `publish` only returns `Ok` once the backend
/// has accepted the message.
#[async_trait]
pub trait BusProvider: Send + Sync {
    /// Publish a string-encoded body to a topic
    async fn publish(&self, topic: &str, body: &str) -> Result<DeliveryAck>;

    /// Create a durable subscription to a topic
    ///
    /// Subscriptions with the same `consumer` name share progress.
    async fn subscribe(&self, topic: &str, consumer: &str) -> Result<Box<dyn Subscription>>;

    /// Provider name (e.g., "nats", "memory")
    fn name(&self) -> &str;

    /// Health check; returns true if the provider is connected and operational
    async fn health(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Async subscription handle for receiving bus messages
#[async_trait]
pub trait Subscription: Send {
    /// Receive the next message; `None` when the subscription is closed
    ///
    /// The message stays unacknowledged until `ack` or `nak` is called on
    /// the returned handle.
    async fn next(&mut self) -> Result<Option<PendingMessage>>;
}

type SettleFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// A bus message pending acknowledgement
pub struct PendingMessage {
    /// The received message
    pub message: BusMessage,

    /// Delivery attempt, starting at 1
    pub attempt: u32,

    /// Ack callback, confirms processing
    ack_fn: SettleFn,

    /// Nak callback, requests redelivery
    nak_fn: SettleFn,
}

impl PendingMessage {
    /// Create a pending message with ack/nak callbacks
    pub fn new(
        message: BusMessage,
        attempt: u32,
        ack_fn: impl FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
        nak_fn: impl FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
    ) -> Self {
        Self {
            message,
            attempt,
            ack_fn: Box::new(ack_fn),
            nak_fn: Box::new(nak_fn),
        }
    }

    /// Acknowledge successful processing
    pub async fn ack(self) -> Result<()> {
        (self.ack_fn)().await
    }

    /// Negative-acknowledge (request redelivery)
    pub async fn nak(self) -> Result<()> {
        (self.nak_fn)().await
    }
}

impl std::fmt::Debug for PendingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMessage")
            .field("message", &self.message)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// Build the configured bus provider
pub async fn connect_bus(config: &BusConfig) -> Result<Arc<dyn BusProvider>> {
    let provider: Arc<dyn BusProvider> = match config.provider {
        BusBackend::Memory => Arc::new(memory::MemoryProvider::default()),
        BusBackend::Nats => Arc::new(nats::NatsProvider::connect(config.nats.clone()).await?),
    };
    tracing::info!(provider = provider.name(), "Bus provider ready");
    Ok(provider)
}
