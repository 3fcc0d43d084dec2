//! Bus consumers for routed events
//!
//! `user-events` carry chat commands for the bot; `channel-events` carry
//! channel membership changes that trigger credential provisioning.

use crate::command::{command_text, interpret, reply_for, TradeIntent};
use crate::error::Result;
use crate::event::{CallbackType, VerifiedEvent};
use crate::messenger::Messenger;
use crate::provider::Subscription;
use crate::provision::CredentialProvisioner;
use async_trait::async_trait;
use std::sync::Arc;

/// Handles one routed event taken off the bus
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &VerifiedEvent) -> Result<()>;
}

/// Receives parsed trade intents
///
/// Matching and recommendations live behind this boundary.
#[async_trait]
pub trait TradeHandler: Send + Sync {
    async fn handle_trade(
        &self,
        team_id: Option<&str>,
        user_id: Option<&str>,
        intent: &TradeIntent,
    ) -> Result<()>;
}

/// Trade handler that only logs intents
#[derive(Debug, Default, Clone)]
pub struct LoggingTradeHandler;

#[async_trait]
impl TradeHandler for LoggingTradeHandler {
    async fn handle_trade(
        &self,
        team_id: Option<&str>,
        user_id: Option<&str>,
        intent: &TradeIntent,
    ) -> Result<()> {
        tracing::info!(
            team_id = ?team_id,
            user_id = ?user_id,
            intent = ?intent,
            "Trade intent received"
        );
        Ok(())
    }
}

/// Interprets chat commands and answers through the bot
pub struct UserEventConsumer {
    provisioner: CredentialProvisioner,
    messenger: Arc<dyn Messenger>,
    trades: Arc<dyn TradeHandler>,
}

impl UserEventConsumer {
    pub fn new(
        provisioner: CredentialProvisioner,
        messenger: Arc<dyn Messenger>,
        trades: Arc<dyn TradeHandler>,
    ) -> Self {
        Self {
            provisioner,
            messenger,
            trades,
        }
    }
}

#[async_trait]
impl EventHandler for UserEventConsumer {
    async fn handle(&self, event: &VerifiedEvent) -> Result<()> {
        let Some(callback) = event.event.as_ref() else {
            tracing::warn!(event_id = ?event.event_id, "User event without callback body");
            return Ok(());
        };
        let Some(text) = command_text(callback) else {
            tracing::warn!(kind = %callback.kind, "Event is not supported by the user consumer");
            return Ok(());
        };

        let intent = interpret(&text);
        tracing::debug!(intent = ?intent, "Command interpreted");

        if intent.is_trade() {
            self.trades
                .handle_trade(event.workspace_id(), callback.user.as_deref(), &intent)
                .await?;
        }

        let Some(reply) = reply_for(&intent) else {
            return Ok(());
        };
        let (Some(team_id), Some(channel)) = (event.workspace_id(), callback.channel.as_deref())
        else {
            tracing::warn!(
                event_id = ?event.event_id,
                "Cannot reply: workspace or channel missing"
            );
            return Ok(());
        };
        let Some(token) = self.provisioner.workspace_bot_token(team_id).await? else {
            tracing::warn!(team_id = %team_id, "Cannot reply: workspace is not installed");
            return Ok(());
        };

        self.messenger.post_message(channel, reply, &token).await
    }
}

/// Provisions credentials for channels the bot joins
pub struct ChannelEventConsumer {
    provisioner: CredentialProvisioner,
}

impl ChannelEventConsumer {
    pub fn new(provisioner: CredentialProvisioner) -> Self {
        Self { provisioner }
    }
}

#[async_trait]
impl EventHandler for ChannelEventConsumer {
    async fn handle(&self, event: &VerifiedEvent) -> Result<()> {
        let Some(callback) = event.event.as_ref() else {
            tracing::warn!(event_id = ?event.event_id, "Channel event without callback body");
            return Ok(());
        };
        if callback.kind != CallbackType::MemberJoinedChannel {
            tracing::warn!(kind = %callback.kind, "Event is not supported by the channel consumer");
            return Ok(());
        }
        let (Some(team_id), Some(channel_id)) = (event.workspace_id(), callback.channel.as_deref())
        else {
            tracing::warn!(event_id = ?event.event_id, "Join event without workspace or channel");
            return Ok(());
        };

        let binding = self.provisioner.provision_channel(team_id, channel_id).await?;
        tracing::debug!(channel = %binding.key(), endpoint = %binding.endpoint, "Channel ready");
        Ok(())
    }
}

/// Deliveries of one message before a retryable failure is given up on
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Drive `handler` with every message on `subscription`
///
/// A message is acked once handled. Retryable failures are nak'd for
/// redelivery until `MAX_DELIVERY_ATTEMPTS`; permanent failures are logged
/// and acked. A subscription failure ends the loop. Returns the number of
/// messages handled successfully.
pub async fn run_consumer(
    mut subscription: Box<dyn Subscription>,
    handler: &dyn EventHandler,
) -> Result<u64> {
    let mut handled = 0u64;
    while let Some(pending) = subscription.next().await? {
        let message_id = pending.message.id.clone();
        let topic = pending.message.topic.clone();
        let attempt = pending.attempt;

        let outcome = match VerifiedEvent::from_bus_message(&pending.message.body) {
            Ok(event) => handler.handle(&event).await,
            Err(e) => Err(e),
        };

        let settled = match outcome {
            Ok(()) => {
                handled += 1;
                pending.ack().await
            }
            Err(e) if e.is_retryable() && attempt < MAX_DELIVERY_ATTEMPTS => {
                tracing::warn!(
                    message_id = %message_id,
                    topic = %topic,
                    attempt,
                    error = %e,
                    "Handler failed; message will be redelivered"
                );
                pending.nak().await
            }
            Err(e) => {
                tracing::error!(
                    message_id = %message_id,
                    topic = %topic,
                    attempt,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Dropping bus message"
                );
                pending.ack().await
            }
        };

        if let Err(e) = settled {
            tracing::warn!(message_id = %message_id, error = %e, "Failed to settle bus message");
        }
    }
    tracing::info!(handled, "Subscription closed");
    Ok(handled)
}
