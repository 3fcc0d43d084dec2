//! a3s-webhook - signed chat-platform webhook ingestion
//!
//! `serve` runs the HTTP endpoints; `consume` runs a bus consumer for one
//! routed topic.

use a3s_webhook::config::{BusBackend, WebhookConfig};
use a3s_webhook::consumer::{
    run_consumer, ChannelEventConsumer, EventHandler, LoggingTradeHandler, UserEventConsumer,
};
use a3s_webhook::crypto::CryptoVault;
use a3s_webhook::messenger::ChatApiMessenger;
use a3s_webhook::provider::{connect_bus, BusProvider};
use a3s_webhook::provision::CredentialProvisioner;
use a3s_webhook::secrets::EnvSecretStore;
use a3s_webhook::server;
use a3s_webhook::store::open_store;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "a3s-webhook")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Signed webhook ingestion and encrypted workspace credentials")]
struct Cli {
    /// Configuration file path (.toml)
    #[arg(short, long, env = "A3S_WEBHOOK_CONFIG", default_value = "a3s-webhook.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Also run both bus consumers in this process
        #[arg(long)]
        with_consumers: bool,
    },

    /// Consume routed events from one topic
    Consume {
        /// Topic to consume
        #[arg(value_enum)]
        topic: TopicArg,

        /// Durable consumer name
        #[arg(long, default_value = "a3s-webhook")]
        consumer: String,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum TopicArg {
    User,
    Channel,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = WebhookConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        Commands::Serve {
            host,
            port,
            with_consumers,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let with_consumers = inline_consumers(&config, with_consumers);
            run_server(config, with_consumers).await?;
        }
        Commands::Consume { topic, consumer } => {
            ensure_shared_bus(&config)?;
            run_consume(config, topic, &consumer).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("a3s_webhook={},tower_http={}", level, level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// The memory bus only reaches consumers in the serving process
fn inline_consumers(config: &WebhookConfig, requested: bool) -> bool {
    if config.bus.provider == BusBackend::Memory && !requested {
        tracing::info!("Memory bus selected; running consumers in-process");
        return true;
    }
    requested
}

fn ensure_shared_bus(config: &WebhookConfig) -> Result<()> {
    if config.bus.provider == BusBackend::Memory {
        bail!(
            "`consume` needs a shared bus; the memory bus is only reachable from \
             `serve`, which runs its consumers in-process"
        );
    }
    Ok(())
}

/// Vault, store and provisioner; a missing or invalid key aborts startup
async fn build_provisioner(
    config: &WebhookConfig,
    secrets: &EnvSecretStore,
) -> Result<CredentialProvisioner> {
    let vault = CryptoVault::global(
        secrets,
        &config.secrets.encryption_key_param,
        config.timeouts.secret(),
    )
    .await
    .context("Failed to load the encryption key; refusing to start")?;

    let store = open_store(&config.store).await?;
    Ok(CredentialProvisioner::new(store, vault, config.timeouts.store()))
}

fn handler_for(
    topic: TopicArg,
    config: &WebhookConfig,
    provisioner: CredentialProvisioner,
) -> Result<Box<dyn EventHandler>> {
    let handler: Box<dyn EventHandler> = match topic {
        TopicArg::User => {
            let messenger = ChatApiMessenger::new(config.timeouts.http())?;
            Box::new(UserEventConsumer::new(
                provisioner,
                Arc::new(messenger),
                Arc::new(LoggingTradeHandler),
            ))
        }
        TopicArg::Channel => Box::new(ChannelEventConsumer::new(provisioner)),
    };
    Ok(handler)
}

fn topic_name(config: &WebhookConfig, topic: TopicArg) -> &str {
    match topic {
        TopicArg::User => &config.bus.topics.user_events,
        TopicArg::Channel => &config.bus.topics.channel_events,
    }
}

async fn run_server(config: WebhookConfig, with_consumers: bool) -> Result<()> {
    let secrets = EnvSecretStore;
    let provisioner = build_provisioner(&config, &secrets).await?;
    let provider = connect_bus(&config.bus).await?;

    if with_consumers {
        for topic in [TopicArg::User, TopicArg::Channel] {
            spawn_consumer(&config, provider.as_ref(), topic, provisioner.clone()).await?;
        }
    }

    let state = server::build_state(&config, &secrets, provider, provisioner).await?;
    server::serve(&config, state).await?;
    Ok(())
}

async fn spawn_consumer(
    config: &WebhookConfig,
    provider: &dyn BusProvider,
    topic: TopicArg,
    provisioner: CredentialProvisioner,
) -> Result<()> {
    let name = topic_name(config, topic).to_string();
    let subscription = provider.subscribe(&name, "a3s-webhook-inline").await?;
    let handler = handler_for(topic, config, provisioner)?;

    tokio::spawn(async move {
        if let Err(e) = run_consumer(subscription, handler.as_ref()).await {
            tracing::error!(topic = %name, error = %e, "Inline consumer stopped");
        }
    });
    Ok(())
}

async fn run_consume(config: WebhookConfig, topic: TopicArg, consumer: &str) -> Result<()> {
    let secrets = EnvSecretStore;
    let provisioner = build_provisioner(&config, &secrets).await?;
    let provider = connect_bus(&config.bus).await?;

    let name = topic_name(&config, topic);
    let subscription = provider
        .subscribe(name, consumer)
        .await
        .with_context(|| format!("Failed to subscribe to {}", name))?;
    let handler = handler_for(topic, &config, provisioner)?;

    tracing::info!(topic = %name, consumer = %consumer, "Consuming");
    let handled = run_consumer(subscription, handler.as_ref()).await?;
    tracing::info!(handled, "Consumer finished");
    Ok(())
}
