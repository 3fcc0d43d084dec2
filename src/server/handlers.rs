use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::state::AppState;
use crate::classify::{classify, RoutingDecision};
use crate::error::{Result, WebhookError};
use crate::event::VerifiedEvent;
use crate::oauth::{complete_oauth, OAuthCallback};

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(serde_json::json!({ "message": text }))).into_response()
}

/// POST /slack/events - Signed Events API delivery.
///
/// The body is taken as raw bytes; it must not be re-encoded before the
/// signature check.
pub async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let verified = state.verifier.verify_request(&headers, body).map_err(|e| {
        tracing::warn!("Rejected webhook: signature verification failed");
        e
    })?;

    let event = VerifiedEvent::parse(&verified).map_err(|e| {
        tracing::warn!(error = %e, "Rejected webhook: malformed event");
        e
    })?;

    let decision = classify(&event);
    match &decision {
        RoutingDecision::Challenge(token) => {
            tracing::info!("Answered url_verification challenge");
            Ok(Json(serde_json::json!({ "challenge": token })).into_response())
        }
        RoutingDecision::Filtered => {
            tracing::debug!(event_id = ?event.event_id, "Filtered bot message");
            Ok(message(StatusCode::OK, "OK"))
        }
        RoutingDecision::Rejected(reason) => {
            tracing::warn!(
                event_id = ?event.event_id,
                reason = %reason,
                "Rejected webhook: unsupported event"
            );
            Err(WebhookError::UnsupportedEvent(reason.to_string()))
        }
        RoutingDecision::RouteToChannelTopic | RoutingDecision::RouteToUserTopic => {
            state
                .publisher
                .publish(&event, &decision)
                .await
                .map_err(|e| {
                    tracing::error!(
                        event_id = ?event.event_id,
                        decision = decision.label(),
                        error = %e,
                        "Failed to publish routed event"
                    );
                    e
                })?;
            Ok(message(StatusCode::ACCEPTED, "Accepted"))
        }
    }
}

/// POST /slack/interaction - Interactive component payloads.
///
/// Signed like event deliveries. Payloads are acknowledged and logged; no
/// interactive flows are handled yet.
pub async fn slack_interaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let verified = state.verifier.verify_request(&headers, body).map_err(|e| {
        tracing::warn!("Rejected interaction: signature verification failed");
        e
    })?;

    tracing::info!(bytes = verified.as_bytes().len(), "Interaction payload acknowledged");
    Ok(message(StatusCode::OK, "Success"))
}

/// GET /slack/oauth/redirect - OAuth install completion.
pub async fn oauth_redirect(
    State(state): State<AppState>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response> {
    let workspace = complete_oauth(&callback, state.oauth.as_ref(), &state.provisioner)
        .await
        .map_err(|e| {
            if e.status_code().is_server_error() {
                tracing::error!(error = %e, "OAuth completion failed");
            }
            e
        })?;

    tracing::info!(team_id = %workspace.team_id, "Workspace installed");
    Ok(message(StatusCode::OK, "success"))
}

/// GET /health - Bus health.
pub async fn health(State(state): State<AppState>) -> Response {
    let bus = state.publisher.provider_name().to_string();
    match state.publisher.health().await {
        Ok(true) => Json(serde_json::json!({ "status": "ok", "bus": bus })).into_response(),
        Ok(false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unavailable", "bus": bus })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Bus health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable", "bus": bus })),
            )
                .into_response()
        }
    }
}
