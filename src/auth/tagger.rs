use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use std::sync::Arc;

use super::store::CredentialStore;
use super::types::CredentialSnapshot;

/// Attaches the current bearer credential to outgoing requests
#[derive(Clone)]
pub struct RequestTagger {
    store: Arc<CredentialStore>,
}

impl RequestTagger {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Tag `request` with whatever credential the store holds right now.
    /// Returns the snapshot that was used.
    pub fn tag(&self, request: &mut Request) -> CredentialSnapshot {
        let snapshot = self.store.snapshot();
        if let Some(ref token) = snapshot.token {
            Self::tag_with(request, token);
        }
        snapshot
    }

    /// Tag `request` with a specific credential
    pub fn tag_with(request: &mut Request, token: &str) {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            Err(_) => {
                tracing::warn!(
                    url = %request.url(),
                    "Credential is not a valid header value, sending request untagged"
                );
            }
        }
    }
}
