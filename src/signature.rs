//! Slack request signature verification
//!
//! Every inbound webhook carries `X-Slack-Request-Timestamp` and
//! `X-Slack-Signature`. The signature is
//! `v0=hex(HMAC-SHA256(signing_secret, "v0:{timestamp}:{raw_body}"))`, computed
//! over the body bytes exactly as received.

use crate::error::{Result, WebhookError};
use axum::http::HeaderMap;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signature version prefix
pub const SIGNATURE_VERSION: &str = "v0";

/// Header carrying the request timestamp (seconds since epoch)
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Header carrying the request signature
pub const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Default replay window in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Raw request body that passed signature verification
///
/// Only [`SignatureVerifier`] can construct one, so anything parsed from it
/// is known to be authentic.
#[derive(Debug, Clone)]
pub struct VerifiedBody {
    bytes: Bytes,
}

impl VerifiedBody {
    /// The verified bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[cfg(test)]
    pub(crate) fn for_test(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

/// HMAC-SHA256 verifier for signed webhooks
#[derive(Clone)]
pub struct SignatureVerifier {
    signing_secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    /// Create a verifier with the default 300-second replay window
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Override the replay window
    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify against the current wall clock
    pub fn verify(&self, raw_body: &[u8], timestamp: &str, signature: &str) -> bool {
        self.verify_at(raw_body, timestamp, signature, chrono::Utc::now().timestamp())
    }

    /// Verify against an explicit `now` (seconds since epoch)
    ///
    /// Returns false for stale timestamps, malformed headers, and signature
    /// mismatches alike.
    pub fn verify_at(&self, raw_body: &[u8], timestamp: &str, signature: &str, now: i64) -> bool {
        let ts: i64 = match timestamp.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::debug!("Rejecting request: unparseable timestamp");
                return false;
            }
        };

        if now.abs_diff(ts) > self.tolerance_secs.unsigned_abs() {
            tracing::debug!(skew = now.saturating_sub(ts), "Rejecting request: stale timestamp");
            return false;
        }

        let expected = match signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .and_then(|digest| hex::decode(digest).ok())
        {
            Some(bytes) => bytes,
            None => {
                tracing::debug!("Rejecting request: malformed signature header");
                return false;
            }
        };

        let mac = match base_mac(&self.signing_secret, timestamp, raw_body) {
            Ok(mac) => mac,
            Err(_) => return false,
        };

        // Constant-time comparison
        mac.verify_slice(&expected).is_ok()
    }

    /// Verify an HTTP request and hand back the body as a [`VerifiedBody`]
    pub fn verify_request(&self, headers: &HeaderMap, body: Bytes) -> Result<VerifiedBody> {
        self.verify_request_at(headers, body, chrono::Utc::now().timestamp())
    }

    /// [`verify_request`](Self::verify_request) with an explicit clock
    pub fn verify_request_at(
        &self,
        headers: &HeaderMap,
        body: Bytes,
        now: i64,
    ) -> Result<VerifiedBody> {
        let timestamp = headers
            .get(TIMESTAMP_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(WebhookError::Authentication)?;
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(WebhookError::Authentication)?;

        if self.verify_at(&body, timestamp, signature, now) {
            Ok(VerifiedBody { bytes: body })
        } else {
            Err(WebhookError::Authentication)
        }
    }
}

/// Compute the `v0=` signature for a body (used by senders and tests)
pub fn sign(signing_secret: &str, timestamp: &str, raw_body: &[u8]) -> Result<String> {
    let mac = base_mac(signing_secret, timestamp, raw_body)?;
    Ok(format!(
        "{}={}",
        SIGNATURE_VERSION,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// HMAC over `v0:{timestamp}:{raw_body}`
fn base_mac(signing_secret: &str, timestamp: &str, raw_body: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .map_err(|e| WebhookError::Config(format!("Invalid signing secret: {}", e)))?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(raw_body);
    Ok(mac)
}
