use tokio::sync::broadcast;

use crate::error::RefreshError;

/// Ends the authenticated session after an unrecoverable refresh failure
///
/// Called once per failed refresh, after the credential store is cleared and
/// every parked request has been rejected. Must not block.
pub trait SessionTeardown: Send + Sync {
    fn end_session(&self, reason: &RefreshError);
}

impl<F> SessionTeardown for F
where
    F: Fn(&RefreshError) + Send + Sync,
{
    fn end_session(&self, reason: &RefreshError) {
        self(reason)
    }
}

/// Session lifecycle notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credential is gone; navigate to the login surface and drop session state
    Expired { reason: String },
}

/// Teardown that broadcasts a `SessionEvent` to every subscriber
#[derive(Clone)]
pub struct SessionSignal {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for SessionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTeardown for SessionSignal {
    fn end_session(&self, reason: &RefreshError) {
        tracing::warn!("Session ended: {}", reason);
        // No subscribers is fine
        let _ = self.tx.send(SessionEvent::Expired {
            reason: reason.to_string(),
        });
    }
}
