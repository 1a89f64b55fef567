//! Credential Storage
//!
//! Holds the single credential pair for the signed-in user.
//!
//! ## Behaviour
//!
//! - One in-memory copy, loaded lazily on the first `get`
//! - Writes go through to the `SecureStore` on `set` and `clear` only
//! - `get` never fails: a missing, unreadable or corrupt persisted value reads
//!   as "no credential", and a corrupt value is deleted on the spot
//! - Token values are never logged
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{CredentialPair, TokenStore};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let token_store = TokenStore::new(secure_store, "authTokens");
//!
//! token_store
//!     .set(CredentialPair::new("access", Some("refresh".to_string())))
//!     .await?;
//!
//! assert!(token_store.get().await.is_some());
//!
//! token_store.clear().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::CredentialPair;
use bridge_traits::storage::SecureStore;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Lenient view of the persisted blob; an entry without `access` is corrupt.
#[derive(Deserialize)]
struct StoredCredential {
    access: Option<String>,
    refresh: Option<String>,
}

enum CacheState {
    Unloaded,
    Loaded(Option<CredentialPair>),
}

pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
    key: String,
    cache: RwLock<CacheState>,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        Self {
            secure_store,
            key: key.into(),
            cache: RwLock::new(CacheState::Unloaded),
        }
    }

    /// Current credential pair, if any.
    pub async fn get(&self) -> Option<CredentialPair> {
        if let CacheState::Loaded(pair) = &*self.cache.read().await {
            return pair.clone();
        }

        let mut cache = self.cache.write().await;
        if let CacheState::Loaded(pair) = &*cache {
            return pair.clone();
        }

        match self.load().await {
            Ok(pair) => {
                *cache = CacheState::Loaded(pair.clone());
                pair
            }
            Err(e) => {
                // Stay unloaded so the next call retries the store.
                warn!(key = %self.key, error = %e, "Failed to read credential from secure storage");
                None
            }
        }
    }

    /// Replace the credential pair.
    ///
    /// The in-memory copy is updated even if persistence fails, so the current
    /// process keeps working; the persistence error is still returned.
    pub async fn set(&self, pair: CredentialPair) -> Result<()> {
        let json = serde_json::to_vec(&pair).map_err(|e| AuthError::SerializationFailed {
            context: "credential pair".to_string(),
            source: e,
        })?;

        let has_refresh = pair.has_refresh();
        *self.cache.write().await = CacheState::Loaded(Some(pair));

        self.secure_store
            .set_secret(&self.key, &json)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to persist credential");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(key = %self.key, has_refresh, "Credential stored");
        Ok(())
    }

    /// Remove the credential pair from memory and from the secure store.
    pub async fn clear(&self) -> Result<()> {
        *self.cache.write().await = CacheState::Loaded(None);

        self.secure_store
            .delete_secret(&self.key)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to delete credential");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(key = %self.key, "Credential cleared");
        Ok(())
    }

    pub async fn has_credential(&self) -> bool {
        self.get().await.is_some()
    }

    async fn load(&self) -> std::result::Result<Option<CredentialPair>, bridge_traits::BridgeError> {
        let Some(data) = self.secure_store.get_secret(&self.key).await? else {
            debug!(key = %self.key, "No credential in storage");
            return Ok(None);
        };

        let parsed = serde_json::from_slice::<StoredCredential>(&data)
            .ok()
            .and_then(|stored| match stored.access {
                Some(access) if !access.is_empty() => {
                    Some(CredentialPair::new(access, stored.refresh))
                }
                _ => None,
            });

        if parsed.is_none() {
            warn!(key = %self.key, "Stored credential is corrupt, discarding it");
            if let Err(e) = self.secure_store.delete_secret(&self.key).await {
                warn!(key = %self.key, error = %e, "Failed to delete corrupt credential");
            }
        }

        Ok(parsed)
    }
}
