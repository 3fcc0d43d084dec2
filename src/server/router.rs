use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Build the complete axum Router with all webhook routes.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/slack/events", post(handlers::slack_events))
        .route("/slack/interaction", post(handlers::slack_interaction))
        .route("/slack/oauth/redirect", get(handlers::oauth_redirect))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
