//! # a3s-webhook
//!
//! Signed webhook ingestion, event routing, and encrypted workspace
//! credentials for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-webhook` receives Slack Events API deliveries, verifies their `v0`
//! HMAC signature, classifies each event, and publishes the full payload to
//! a topic on a pluggable message bus. Consumers on those topics interpret
//! chat commands and provision per-channel credentials. OAuth installs store
//! workspace tokens sealed with AES-256-GCM.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_webhook::classify::{classify, RoutingDecision};
//! use a3s_webhook::event::VerifiedEvent;
//! use a3s_webhook::signature::{sign, SignatureVerifier};
//! use axum::http::HeaderMap;
//!
//! # fn example() -> a3s_webhook::Result<()> {
//! let verifier = SignatureVerifier::new("signing-secret");
//! let body = br#"{"type":"url_verification","challenge":"abc123"}"#;
//! let ts = chrono::Utc::now().timestamp().to_string();
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("x-slack-request-timestamp", ts.parse().unwrap());
//! headers.insert(
//!     "x-slack-signature",
//!     sign("signing-secret", &ts, body)?.parse().unwrap(),
//! );
//!
//! let verified = verifier.verify_request(&headers, body.to_vec().into())?;
//! let event = VerifiedEvent::parse(&verified)?;
//! assert_eq!(classify(&event), RoutingDecision::Challenge("abc123".into()));
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - **memory** - In-memory bus for testing and single-process use
//! - **nats** - NATS JetStream for durable, at-least-once delivery
//!
//! ## Architecture
//!
//! - **SignatureVerifier** - the only way to obtain a `VerifiedBody`
//! - **classify** - total, order-sensitive mapping to a `RoutingDecision`
//! - **EventPublisher** - topic fan-out with retryable failures
//! - **CredentialProvisioner** - idempotent channel credentials, sealed tokens
//! - **CryptoVault** - process-wide key, initialised once

pub mod classify;
pub mod command;
pub mod config;
pub mod consumer;
pub mod crypto;
pub mod error;
pub mod event;
pub mod messenger;
pub mod oauth;
pub mod provider;
pub mod provision;
pub mod publisher;
pub mod secrets;
pub mod server;
pub mod signature;
pub mod store;
pub mod types;

// Re-export core types
pub use classify::{classify, RejectReason, RoutingDecision, TopicKind};
pub use command::{interpret, reply_for, TradeIntent};
pub use config::WebhookConfig;
pub use crypto::{CryptoVault, EncryptedSecret};
pub use error::{Result, WebhookError};
pub use event::VerifiedEvent;
pub use provider::{BusProvider, PendingMessage, Subscription};
pub use provision::CredentialProvisioner;
pub use publisher::EventPublisher;
pub use signature::{SignatureVerifier, VerifiedBody};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use types::{BusMessage, ChannelBinding, ChannelKey, DeliveryAck, Workspace};

// Re-export providers for convenience
pub use provider::memory::{MemoryConfig, MemoryProvider};
pub use provider::nats::{NatsClient, NatsConfig, NatsProvider, NatsSubscription, StorageType};
