//! Error types for a3s-webhook

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur while ingesting webhooks or managing credentials
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Bad, stale, or missing request signature
    ///
    /// Deliberately carries no detail: every verification failure must look
    /// the same to the sender.
    #[error("Request signature verification failed")]
    Authentication,

    /// Body is not a well-formed event envelope
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Event is well-formed but not something this service handles
    #[error("Unsupported event: {0}")]
    UnsupportedEvent(String),

    /// A decision without a topic was handed to the publisher
    #[error("Routing decision '{0}' has no topic")]
    NotRoutable(String),

    /// Message bus rejected or failed to acknowledge a publish
    #[error("Failed to publish to topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// Message bus subscription failure
    #[error("Failed to subscribe to topic '{topic}': {reason}")]
    Subscribe { topic: String, reason: String },

    /// Message bus connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Durable store read/write failure
    #[error("Store error: {0}")]
    Store(String),

    /// Parameter store lookup failure
    #[error("Secret store error for '{name}': {reason}")]
    SecretStore { name: String, reason: String },

    /// Outbound chat API call failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// A blocking dependency did not answer in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Ciphertext could not be decrypted (tampered, wrong key, corrupt)
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Plaintext could not be encrypted
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// OAuth completion rejected by the client or the platform
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP listener failure
    #[error("Server error: {0}")]
    Server(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WebhookError {
    /// Whether the failure is transient and the caller should retry delivery
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Publish { .. }
                | WebhookError::Subscribe { .. }
                | WebhookError::Connection(_)
                | WebhookError::Store(_)
                | WebhookError::SecretStore { .. }
                | WebhookError::Http(_)
                | WebhookError::Timeout(_)
        )
    }

    /// HTTP status reported to the webhook sender
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Authentication => StatusCode::FORBIDDEN,
            WebhookError::MalformedEvent(_)
            | WebhookError::UnsupportedEvent(_)
            | WebhookError::OAuth(_) => StatusCode::BAD_REQUEST,
            e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response message; internal details never leave the process
    fn public_message(&self) -> String {
        match self {
            WebhookError::Authentication => "Forbidden".to_string(),
            WebhookError::MalformedEvent(_) | WebhookError::UnsupportedEvent(_) => {
                "Bad Request".to_string()
            }
            WebhookError::OAuth(reason) => reason.clone(),
            e if e.is_retryable() => "Service Unavailable".to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "message": self.public_message() });
        (self.status_code(), axum::Json(body)).into_response()
    }
}

/// Result type alias for webhook operations
pub type Result<T> = std::result::Result<T, WebhookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_failures_are_retryable() {
        assert!(WebhookError::Timeout("bus".into()).is_retryable());
        assert!(WebhookError::Store("down".into()).is_retryable());
        assert!(WebhookError::Publish {
            topic: "user-events".into(),
            reason: "no ack".into()
        }
        .is_retryable());
        assert!(!WebhookError::Authentication.is_retryable());
        assert!(!WebhookError::Decryption("tag".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(WebhookError::Authentication.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            WebhookError::UnsupportedEvent("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::Timeout("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            WebhookError::Decryption("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_details() {
        let err = WebhookError::Store("table teams unreachable at 10.0.0.4".into());
        assert_eq!(err.public_message(), "Service Unavailable");
        assert_eq!(WebhookError::Authentication.public_message(), "Forbidden");
    }
}
