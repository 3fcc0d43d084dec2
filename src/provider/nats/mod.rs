//! NATS JetStream bus provider
//!
//! Implements `BusProvider` on top of a single JetStream stream so routed
//! events survive restarts and are delivered at least once.

mod client;
mod config;

pub use client::{NatsClient, NatsSubscription};
pub use config::{NatsConfig, StorageType};

use crate::error::Result;
use crate::provider::{BusProvider, PendingMessage, Subscription};
use crate::types::DeliveryAck;
use async_trait::async_trait;

/// NATS JetStream bus provider
///
/// Wraps `NatsClient` and implements the `BusProvider` trait.
pub struct NatsProvider {
    client: NatsClient,
}

impl NatsProvider {
    /// Connect to NATS and initialize the JetStream stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = NatsClient::connect(config).await?;
        Ok(Self { client })
    }

    /// Get the underlying NATS client
    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait]
impl BusProvider for NatsProvider {
    async fn publish(&self, topic: &str, body: &str) -> Result<DeliveryAck> {
        self.client.publish(topic, body).await
    }

    async fn subscribe(&self, topic: &str, consumer: &str) -> Result<Box<dyn Subscription>> {
        let sub = self.client.subscribe(topic, consumer).await?;
        Ok(Box::new(sub))
    }

    fn name(&self) -> &str {
        "nats"
    }

    async fn health(&self) -> Result<bool> {
        Ok(self.client.is_connected())
    }
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next(&mut self) -> Result<Option<PendingMessage>> {
        self.next_message().await
    }
}
