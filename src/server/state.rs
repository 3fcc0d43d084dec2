use std::sync::Arc;

use crate::oauth::OAuthClient;
use crate::provision::CredentialProvisioner;
use crate::publisher::EventPublisher;
use crate::signature::SignatureVerifier;

/// Shared application state accessible to all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<SignatureVerifier>,
    pub publisher: Arc<EventPublisher>,
    pub provisioner: Arc<CredentialProvisioner>,
    pub oauth: Arc<dyn OAuthClient>,
}

impl AppState {
    pub fn new(
        verifier: SignatureVerifier,
        publisher: EventPublisher,
        provisioner: CredentialProvisioner,
        oauth: Arc<dyn OAuthClient>,
    ) -> Self {
        Self {
            verifier: Arc::new(verifier),
            publisher: Arc::new(publisher),
            provisioner: Arc::new(provisioner),
            oauth,
        }
    }
}
