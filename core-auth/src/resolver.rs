//! Per-endpoint memory of which `Authorization` scheme works.
//!
//! Entries live only in memory and are keyed by the first path segment, so
//! every route under `patient-profile/` shares one answer.

use crate::types::AuthScheme;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Cache key for a resource path.
///
/// ```
/// use core_auth::endpoint_key;
///
/// assert_eq!(endpoint_key("patient-profile/42/"), "patient-profile");
/// assert_eq!(endpoint_key("/vaccines/?page=2"), "vaccines");
/// assert_eq!(endpoint_key("auth/users/me/"), "auth");
/// ```
pub fn endpoint_key(path: &str) -> String {
    let path = path.trim_start_matches('/');
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').next().unwrap_or_default().to_string()
}

/// Joins a resource path onto a base URL that ends with `/`.
pub fn join_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{}{}", base_url, path.trim_start_matches('/'))
    } else {
        format!("{}/{}", base_url, path.trim_start_matches('/'))
    }
}

/// Endpoint prefix to last-known-working scheme.
///
/// Races between concurrent executions are benign: last writer wins and a
/// loser only pays for one redundant trial.
#[derive(Default)]
pub struct SchemeCache {
    entries: RwLock<HashMap<String, AuthScheme>>,
}

impl SchemeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached scheme for `key`. Never touches the network.
    pub async fn resolve(&self, key: &str) -> Option<AuthScheme> {
        self.entries.read().await.get(key).copied()
    }

    /// Records `scheme` for `key`, returning true if the entry changed.
    pub async fn remember(&self, key: &str, scheme: AuthScheme) -> bool {
        let previous = self.entries.write().await.insert(key.to_string(), scheme);
        if previous != Some(scheme) {
            debug!(endpoint = key, scheme = %scheme, "Remembered authorization scheme");
            true
        } else {
            false
        }
    }

    /// Drops the entry for `key`, returning true if there was one.
    pub async fn forget(&self, key: &str) -> bool {
        let removed = self.entries.write().await.remove(key);
        if let Some(scheme) = removed {
            debug!(endpoint = key, scheme = %scheme, "Forgot authorization scheme");
        }
        removed.is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Copy of all entries, for diagnostics.
    pub async fn snapshot(&self) -> HashMap<String, AuthScheme> {
        self.entries.read().await.clone()
    }
}
