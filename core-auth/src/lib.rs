//! # Authentication Module
//!
//! Credential handling for the booking API client.
//!
//! ## Overview
//!
//! The backend issues a JWT access/refresh pair at login but is inconsistent
//! about which `Authorization` prefix each route accepts. This crate keeps the
//! pair in secure storage, learns a working scheme per endpoint, and refreshes
//! an expired access token at most once at a time.
//!
//! ## Components
//!
//! - [`TokenStore`] - lazily loaded credential pair over a `SecureStore`
//! - [`SchemeCache`] - endpoint prefix to last working scheme
//! - [`AuthenticatedExecutor`] - scheme trial, caching and refresh replay
//! - [`RefreshCoordinator`] - single-flight refresh exchange
//! - [`AuthManager`] - login, logout and session state

pub mod error;
pub mod executor;
pub mod manager;
pub mod refresh;
pub mod resolver;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use executor::{AuthenticatedExecutor, FailureKind, RequestFailure, RequestOutcome};
pub use manager::{first_message, login_error_message, AuthManager};
pub use refresh::{RefreshCoordinator, TokenRefresher};
pub use resolver::{endpoint_key, join_url, SchemeCache};
pub use token_store::TokenStore;
pub use types::{AuthScheme, AuthState, CredentialPair};
