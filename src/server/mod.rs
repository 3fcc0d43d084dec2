pub mod handlers;
pub mod router;
pub mod state;

use std::sync::Arc;

use crate::config::WebhookConfig;
use crate::error::{Result, WebhookError};
use crate::oauth::SlackOAuthClient;
use crate::provider::BusProvider;
use crate::provision::CredentialProvisioner;
use crate::publisher::EventPublisher;
use crate::secrets::{get_parameter_with_timeout, SecretStore};
use crate::signature::SignatureVerifier;

pub use state::AppState;

/// Assemble handler state, resolving the signing secret and OAuth client
/// credentials from the secret store.
pub async fn build_state(
    config: &WebhookConfig,
    secrets: &dyn SecretStore,
    provider: Arc<dyn BusProvider>,
    provisioner: CredentialProvisioner,
) -> Result<AppState> {
    let timeout = config.timeouts.secret();
    let signing_secret =
        get_parameter_with_timeout(secrets, &config.secrets.signing_secret_param, true, timeout)
            .await?;
    let client_id =
        get_parameter_with_timeout(secrets, &config.secrets.client_id_param, false, timeout)
            .await?;
    let client_secret =
        get_parameter_with_timeout(secrets, &config.secrets.client_secret_param, true, timeout)
            .await?;

    let oauth = SlackOAuthClient::new(
        client_id,
        client_secret,
        config.oauth.redirect_uri(),
        config.timeouts.http(),
    )?;
    let publisher = EventPublisher::new(
        provider,
        config.bus.topics.clone(),
        config.timeouts.publish(),
    );

    Ok(AppState::new(
        SignatureVerifier::new(signing_secret),
        publisher,
        provisioner,
        Arc::new(oauth),
    ))
}

/// Serve the webhook routes until Ctrl-C.
pub async fn serve(config: &WebhookConfig, state: AppState) -> Result<()> {
    let bind_addr = config.bind_address();
    let app = router::build(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| WebhookError::Server(format!("Failed to bind to {bind_addr}: {e}")))?;

    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| WebhookError::Server(format!("Server error: {e}")))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
