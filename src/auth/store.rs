use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;

use super::storage::DurableStorage;
use super::types::{token_prefix, CredentialSnapshot};

struct Slot {
    token: Option<String>,
    epoch: u64,
}

/// Credential store
/// Single source of truth for the bearer credential, mirrored to durable storage
pub struct CredentialStore {
    slot: RwLock<Slot>,
    storage: Arc<dyn DurableStorage>,
    key: String,
}

impl CredentialStore {
    /// Bootstrap the store from durable storage
    pub fn load(storage: Arc<dyn DurableStorage>, key: impl Into<String>) -> Self {
        let key = key.into();

        let token = match storage.get_item(&key) {
            Ok(Some(token)) if !token.is_empty() => {
                tracing::info!("Restored session credential ({}...)", token_prefix(&token));
                Some(token)
            }
            Ok(_) => {
                tracing::debug!("No stored credential under {}", key);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to read stored credential, starting empty: {:#}", e);
                None
            }
        };

        Self {
            slot: RwLock::new(Slot { token, epoch: 0 }),
            storage,
            key,
        }
    }

    /// Current credential, if any
    pub fn get(&self) -> Option<String> {
        self.slot.read().token.clone()
    }

    /// Current credential and its generation
    pub fn snapshot(&self) -> CredentialSnapshot {
        let slot = self.slot.read();
        CredentialSnapshot {
            token: slot.token.clone(),
            epoch: slot.epoch,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.slot.read().epoch
    }

    pub fn is_empty(&self) -> bool {
        self.slot.read().token.is_none()
    }

    /// Store a new credential
    ///
    /// Memory is updated even when the durable write fails.
    pub fn set(&self, token: &str) -> Result<()> {
        {
            let mut slot = self.slot.write();
            slot.token = Some(token.to_string());
            slot.epoch += 1;
        }
        tracing::debug!("Credential updated ({}...)", token_prefix(token));
        self.storage.set_item(&self.key, token)
    }

    /// Forget the credential. Idempotent.
    pub fn clear(&self) -> Result<()> {
        {
            let mut slot = self.slot.write();
            if slot.token.take().is_some() {
                tracing::debug!("Credential cleared");
            }
            slot.epoch += 1;
        }
        self.storage.remove_item(&self.key)
    }
}
