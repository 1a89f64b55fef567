//! # Core Configuration Module
//!
//! Provides configuration management for the Tika client core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host bridges and the API, auth and payment
//! settings. It enforces fail-fast validation so misconfiguration surfaces at
//! startup rather than on the first request.
//!
//! ## Required Dependencies
//!
//! - `SecureStore` - credential and pending-payment persistence
//! - `HttpClient` - every API call goes through it
//!
//! When the `desktop-shims` feature is enabled, `KeyringSecureStore` and
//! `ReqwestHttpClient` are injected automatically if not provided.
//!
//! ## Environment
//!
//! [`CoreConfigBuilder::from_env`] reads:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `TIKA_API_BASE_URL` | API base URL |
//! | `TIKA_API_TIMEOUT_SECS` | Per-request timeout |
//! | `TIKA_AUTH_SCHEMES` | Comma-separated scheme trial order, e.g. `JWT,Token,Bearer` |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .base_url("https://api.example.com/api/v1/")
//!     .secure_store(Arc::new(MySecureStore))
//!     .http_client(Arc::new(MyHttpClient))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! // Without desktop-shims and without a SecureStore this fails with
//! // `Error::CapabilityMissing { capability: "SecureStore", .. }`
//! let config = CoreConfig::builder().build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, SecureStore, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://nirapod-tika-sub.vercel.app/api/v1/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_TIMEOUT_SECS: u64 = 300;

pub const ENV_BASE_URL: &str = "TIKA_API_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "TIKA_API_TIMEOUT_SECS";
pub const ENV_AUTH_SCHEMES: &str = "TIKA_AUTH_SCHEMES";

/// Header schemes understood by the authenticated-request executor.
const KNOWN_SCHEMES: &[&str] = &["jwt", "token", "bearer", "none"];

/// Core configuration for the Tika client core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,

    /// HTTP transport (required; desktop default: reqwest)
    pub http_client: Arc<dyn HttpClient>,

    /// Credential persistence (required; desktop default: OS keychain)
    pub secure_store: Arc<dyn SecureStore>,

    /// Time source for transaction ids and event timestamps
    pub clock: Arc<dyn Clock>,

    /// Event bus buffer size
    pub event_buffer: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("api", &self.api)
            .field("auth", &self.auth)
            .field("payment", &self.payment)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("clock", &"Clock { ... }")
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

/// Where the backend lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL every resource path is joined onto. Always ends with `/`.
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the base URL and timeout, normalising a missing trailing `/`.
    pub fn validate(&mut self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL '{}': {}", self.base_url, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::Config(format!(
                "API base URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }

        if self.timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0 seconds".to_string(),
            ));
        }

        if self.timeout > Duration::from_secs(MAX_TIMEOUT_SECS) {
            return Err(Error::Config(format!(
                "Request timeout exceeds maximum of {} seconds",
                MAX_TIMEOUT_SECS
            )));
        }

        Ok(())
    }
}

/// Credential handling settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Header schemes tried in order when no scheme is cached for an endpoint.
    pub scheme_order: Vec<String>,
    /// `SecureStore` key holding the credential pair.
    pub credential_key: String,
    /// Path (relative to the base URL) of the token-refresh exchange.
    pub refresh_endpoint: String,
    /// Path of the login exchange.
    pub token_endpoint: String,
    /// Route handed to the host when the session expires.
    pub login_route: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scheme_order: vec!["JWT".to_string(), "Token".to_string(), "Bearer".to_string()],
            credential_key: "authTokens".to_string(),
            refresh_endpoint: "auth/jwt/refresh/".to_string(),
            token_endpoint: "auth/jwt/create/".to_string(),
            login_route: "/login".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn with_scheme_order<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scheme_order = schemes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = key.into();
        self
    }

    pub fn with_refresh_endpoint(mut self, path: impl Into<String>) -> Self {
        self.refresh_endpoint = path.into();
        self
    }

    pub fn with_token_endpoint(mut self, path: impl Into<String>) -> Self {
        self.token_endpoint = path.into();
        self
    }

    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheme_order.is_empty() {
            return Err(Error::SchemeOrder(
                "At least one authorization scheme must be configured".to_string(),
            ));
        }

        let mut seen = Vec::with_capacity(self.scheme_order.len());
        for scheme in &self.scheme_order {
            let normalized = scheme.trim().to_ascii_lowercase();
            if !KNOWN_SCHEMES.contains(&normalized.as_str()) {
                return Err(Error::SchemeOrder(format!(
                    "Unknown authorization scheme '{}'. Expected one of: JWT, Token, Bearer, None",
                    scheme
                )));
            }
            if seen.contains(&normalized) {
                return Err(Error::SchemeOrder(format!(
                    "Authorization scheme '{}' is listed more than once",
                    scheme
                )));
            }
            seen.push(normalized);
        }

        if self.credential_key.trim().is_empty() {
            return Err(Error::Config("Credential key cannot be empty".to_string()));
        }

        if self.refresh_endpoint.trim().is_empty() || self.token_endpoint.trim().is_empty() {
            return Err(Error::Config(
                "Token and refresh endpoints cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Payment hand-off settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfig {
    /// Amount used when neither the schedule nor the vaccine carries a price.
    pub default_amount: f64,
    /// Transaction ids look like `{prefix}-{schedule_id}-{unix_millis}`.
    pub transaction_prefix: String,
    /// `SecureStore` key holding the pending payment record.
    pub pending_key: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            default_amount: 1000.0,
            transaction_prefix: "TIKA-PAY".to_string(),
            pending_key: "pendingPayment".to_string(),
        }
    }
}

impl PaymentConfig {
    pub fn with_default_amount(mut self, amount: f64) -> Self {
        self.default_amount = amount;
        self
    }

    pub fn with_transaction_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.transaction_prefix = prefix.into();
        self
    }

    pub fn with_pending_key(mut self, key: impl Into<String>) -> Self {
        self.pending_key = key.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.default_amount.is_finite() || self.default_amount <= 0.0 {
            return Err(Error::Config(
                "Default payment amount must be a positive number".to_string(),
            ));
        }

        if self.transaction_prefix.trim().is_empty() {
            return Err(Error::Config(
                "Transaction prefix cannot be empty".to_string(),
            ));
        }

        if self.pending_key.trim().is_empty() {
            return Err(Error::Config(
                "Pending payment key cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&mut self) -> Result<()> {
        self.api.validate()?;
        self.auth.validate()?;
        self.payment.validate()?;

        if self.event_buffer == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self
            .auth
            .credential_key
            .eq_ignore_ascii_case(&self.payment.pending_key)
        {
            return Err(Error::Config(
                "Credential key and pending payment key must differ".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for credential persistence. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default KeyringSecureStore. \
                 Tests and short-lived tools: inject bridge_desktop::MemorySecureStore. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the API. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Mobile: inject the platform HTTP stack (URLSession/OkHttp)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(api: &ApiConfig) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(api.timeout).map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_api: &ApiConfig) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    api: ApiConfig,
    auth: AuthConfig,
    payment: PaymentConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the API base URL.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .base_url("http://localhost:8000/api/v1/");
    /// ```
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    /// Sets the per-request timeout. Default: 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.api.timeout = timeout;
        self
    }

    pub fn api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    /// Replaces the header scheme trial order.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .scheme_order(["Bearer", "JWT"]);
    /// ```
    pub fn scheme_order<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth = self.auth.with_scheme_order(schemes);
        self
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn payment(mut self, payment: PaymentConfig) -> Self {
        self.payment = payment;
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the secure store implementation (required).
    ///
    /// Holds the credential pair and the pending payment record.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Sets the time source. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = Some(size);
        self
    }

    /// Applies `TIKA_*` environment overrides on top of the current settings.
    pub fn from_env(self) -> Result<Self> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS).filter(|v| !v.trim().is_empty()) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_TIMEOUT_SECS, raw
                ))
            })?;
            self.api.timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(ENV_AUTH_SCHEMES).filter(|v| !v.trim().is_empty()) {
            self.auth.scheme_order = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(self)
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - Required bridges are missing and no desktop default applies
    /// - Base URL, timeout, scheme order or payment settings are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let mut api = self.api;
        api.validate()?;

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&api)?,
        };

        let mut config = CoreConfig {
            api,
            auth: self.auth,
            payment: self.payment,
            http_client,
            secure_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer: self
                .event_buffer
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
