//! # Authentication Manager
//!
//! Session lifecycle for the booking client: phone-number login, logout and
//! the signed-in state the UI shows.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthManager, SchemeCache, TokenStore};
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//! # use bridge_traits::{SecureStore, http::HttpClient};
//! # async fn example(
//! #     http_client: Arc<dyn HttpClient>,
//! #     secure_store: Arc<dyn SecureStore>,
//! # ) -> core_auth::Result<()> {
//! let token_store = Arc::new(TokenStore::new(secure_store, "authTokens"));
//! let manager = AuthManager::new(
//!     http_client,
//!     token_store,
//!     Arc::new(SchemeCache::new()),
//!     EventBus::new(100),
//!     "https://nirapod-tika-sub.vercel.app/api/v1/auth/jwt/create/",
//! );
//!
//! manager.login("01712345678", "secret").await?;
//! assert!(manager.is_authenticated().await);
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::resolver::SchemeCache;
use crate::token_store::TokenStore;
use crate::types::{AuthState, CredentialPair};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const NO_ACTIVE_ACCOUNT: &str = "No active account found with the given credentials";
const ACCOUNT_NOT_FOUND_MESSAGE: &str = "Account not found. Please check if: 1) You need to register first, 2) Your credentials are correct, or 3) Your account is activated.";
const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your credentials and try again.";
const LOGIN_NETWORK_MESSAGE: &str = "Login failed. Please try again.";

#[derive(Serialize)]
struct LoginRequest<'a> {
    phone_number: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access: String,
    refresh: Option<String>,
}

pub struct AuthManager {
    http_client: Arc<dyn HttpClient>,
    token_store: Arc<TokenStore>,
    schemes: Arc<SchemeCache>,
    event_bus: EventBus,
    token_url: String,
}

impl AuthManager {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        token_store: Arc<TokenStore>,
        schemes: Arc<SchemeCache>,
        event_bus: EventBus,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            token_store,
            schemes,
            event_bus,
            token_url: token_url.into(),
        }
    }

    /// Exchanges phone number and password for a credential pair.
    ///
    /// Errors carry a message meant for the login screen.
    #[instrument(skip_all)]
    pub async fn login(&self, phone_number: &str, password: &str) -> Result<CredentialPair> {
        let request = HttpRequest::new(HttpMethod::Post, self.token_url.clone())
            .json(&LoginRequest {
                phone_number: phone_number.trim(),
                password,
            })
            .map_err(|e| AuthError::InvalidResponse {
                endpoint: self.token_url.clone(),
                reason: e.to_string(),
            })?;

        let response = self.http_client.execute(request).await.map_err(|e| {
            warn!(error = %e, "Login request failed");
            self.emit(AuthEvent::AuthError {
                message: LOGIN_NETWORK_MESSAGE.to_string(),
                recoverable: true,
            });
            AuthError::Network(LOGIN_NETWORK_MESSAGE.to_string())
        })?;

        if !response.is_success() {
            let message = login_error_message(response.json_value().as_ref());
            warn!(status = response.status, "Login rejected");
            self.emit(AuthEvent::AuthError {
                message: message.clone(),
                recoverable: true,
            });
            return Err(AuthError::LoginRejected(message));
        }

        let tokens: LoginResponse =
            response
                .json()
                .map_err(|e| AuthError::InvalidResponse {
                    endpoint: self.token_url.clone(),
                    reason: e.to_string(),
                })?;

        let pair = CredentialPair::new(tokens.access, tokens.refresh);
        if let Err(e) = self.token_store.set(pair.clone()).await {
            // The in-memory copy still serves this process.
            warn!(error = %e, "Credential not persisted after login");
        }
        self.schemes.clear().await;

        info!(has_refresh = pair.has_refresh(), "Signed in");
        self.emit(AuthEvent::SignedIn);
        Ok(pair)
    }

    /// Drops the credential and every learned scheme.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let result = self.token_store.clear().await;
        self.schemes.clear().await;

        info!("Signed out");
        self.emit(AuthEvent::SignedOut);
        result
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token_store.has_credential().await
    }

    pub async fn state(&self) -> AuthState {
        match self.token_store.get().await {
            Some(pair) => AuthState::SignedIn {
                can_refresh: pair.has_refresh(),
            },
            None => AuthState::SignedOut,
        }
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.token_store
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

/// User-facing message for a rejected login.
pub fn login_error_message(body: Option<&Value>) -> String {
    let Some(body) = body else {
        return LOGIN_FAILED_MESSAGE.to_string();
    };

    if let Some(detail) = body.get("detail").and_then(Value::as_str) {
        return if detail == NO_ACTIVE_ACCOUNT {
            ACCOUNT_NOT_FOUND_MESSAGE.to_string()
        } else {
            detail.to_string()
        };
    }

    ["phone_number", "password", "email"]
        .iter()
        .find_map(|field| first_message(body.get(field)?))
        .unwrap_or_else(|| LOGIN_FAILED_MESSAGE.to_string())
}

/// First string of a field error, which may be a list or a bare string.
pub fn first_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(Value::as_str).map(str::to_string),
        _ => None,
    }
}
