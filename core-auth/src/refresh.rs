//! Single-flight access token refresh.
//!
//! Any number of executions may hit a 401 at the same time; only one refresh
//! exchange goes out. Callers that queued behind it see that the stored
//! access token already changed and reuse the new pair.

use crate::executor::RequestFailure;
use crate::token_store::TokenStore;
use crate::types::CredentialPair;
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::time::Clock;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Turns an authorization failure into a fresh credential, if possible.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Returns the pair to replay with, or `None` when the session is over.
    ///
    /// `sent_access` is the access token the failed request carried.
    async fn refresh_if_needed(
        &self,
        failure: &RequestFailure,
        sent_access: &str,
    ) -> Option<CredentialPair>;
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: Option<String>,
}

pub struct RefreshCoordinator {
    http_client: Arc<dyn HttpClient>,
    token_store: Arc<TokenStore>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    refresh_url: String,
    login_route: String,
    in_flight: Mutex<()>,
}

impl RefreshCoordinator {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        token_store: Arc<TokenStore>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        refresh_url: impl Into<String>,
        login_route: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            token_store,
            event_bus,
            clock,
            refresh_url: refresh_url.into(),
            login_route: login_route.into(),
            in_flight: Mutex::new(()),
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Option<String> {
        let request = match HttpRequest::new(HttpMethod::Post, self.refresh_url.clone())
            .json(&RefreshRequest {
                refresh: refresh_token,
            }) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Failed to encode refresh request");
                return None;
            }
        };

        let response = match self.http_client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Refresh request did not reach the server");
                return None;
            }
        };

        if !response.is_success() {
            warn!(status = response.status, "Refresh token rejected");
            return None;
        }

        match response.json::<RefreshResponse>() {
            Ok(RefreshResponse {
                access: Some(access),
            }) if !access.is_empty() => Some(access),
            _ => {
                warn!("Refresh response carried no access token");
                None
            }
        }
    }

    async fn expire_session(&self) {
        if let Err(e) = self.token_store.clear().await {
            warn!(error = %e, "Failed to clear credential after refresh failure");
        }
        info!(redirect_to = %self.login_route, "Session expired");
        self.emit(AuthEvent::SessionExpired {
            redirect_to: self.login_route.clone(),
        });
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

#[async_trait]
impl TokenRefresher for RefreshCoordinator {
    #[instrument(skip(self, failure, sent_access), fields(status = ?failure.status))]
    async fn refresh_if_needed(
        &self,
        failure: &RequestFailure,
        sent_access: &str,
    ) -> Option<CredentialPair> {
        if failure.status != Some(401) {
            return None;
        }

        let _guard = self.in_flight.lock().await;

        let current = self.token_store.get().await;
        if let Some(current) = &current {
            if current.access != sent_access {
                debug!("Access token already refreshed by a concurrent request");
                return Some(current.clone());
            }
        }

        let Some(pair) = current.filter(CredentialPair::has_refresh) else {
            self.expire_session().await;
            return None;
        };
        let refresh_token = pair.refresh.clone().unwrap_or_default();

        self.emit(AuthEvent::TokenRefreshing);

        let Some(access) = self.exchange(&refresh_token).await else {
            self.expire_session().await;
            return None;
        };

        let refreshed = pair.with_access(access);
        if let Err(e) = self.token_store.set(refreshed.clone()).await {
            warn!(error = %e, "Refreshed credential could not be persisted");
        }

        info!("Access token refreshed");
        self.emit(AuthEvent::TokenRefreshed {
            refreshed_at: self.clock.unix_timestamp_millis(),
        });

        Some(refreshed)
    }
}
