use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access/refresh token pair issued by the login exchange.
///
/// The access token is assumed valid until a request proves otherwise; there
/// is no expiry bookkeeping on the client. `Debug` never prints either token.
///
/// # Examples
///
/// ```
/// use core_auth::CredentialPair;
///
/// let pair = CredentialPair::new("access", Some("refresh".to_string()));
/// let refreshed = pair.with_access("new-access");
/// assert_eq!(refreshed.access, "new-access");
/// assert_eq!(refreshed.refresh.as_deref(), Some("refresh"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: access.into(),
            refresh,
        }
    }

    /// Returns a copy carrying a new access token and the same refresh token.
    pub fn with_access(&self, access: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: self.refresh.clone(),
        }
    }

    pub fn has_refresh(&self) -> bool {
        self.refresh.as_deref().is_some_and(|r| !r.is_empty())
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"[REDACTED]")
            .field(
                "refresh",
                &self.refresh.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// `Authorization` header scheme.
///
/// The backend accepts different prefixes on different routes, so the
/// executor learns which one works per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthScheme {
    /// `Authorization: JWT <token>`
    Jwt,
    /// `Authorization: Token <token>`
    Token,
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `Authorization: <token>`
    None,
}

impl AuthScheme {
    /// Trial order used when nothing is configured.
    pub const DEFAULT_ORDER: [AuthScheme; 3] = [AuthScheme::Jwt, AuthScheme::Token, AuthScheme::Bearer];

    /// Literal header prefix, if the scheme has one.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            AuthScheme::Jwt => Some("JWT"),
            AuthScheme::Token => Some("Token"),
            AuthScheme::Bearer => Some("Bearer"),
            AuthScheme::None => None,
        }
    }

    /// Full `Authorization` header value for `token`.
    ///
    /// ```
    /// use core_auth::AuthScheme;
    ///
    /// assert_eq!(AuthScheme::Jwt.header_value("abc"), "JWT abc");
    /// assert_eq!(AuthScheme::None.header_value("abc"), "abc");
    /// ```
    pub fn header_value(&self, token: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{} {}", prefix, token),
            None => token.to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.prefix().unwrap_or("None")
    }

    /// Parses a configured scheme order, e.g. `["JWT", "Token"]`.
    pub fn parse_order<S: AsRef<str>>(names: &[S]) -> Result<Vec<AuthScheme>> {
        names.iter().map(|name| name.as_ref().parse()).collect()
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthScheme {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jwt" => Ok(AuthScheme::Jwt),
            "token" => Ok(AuthScheme::Token),
            "bearer" => Ok(AuthScheme::Bearer),
            "none" | "" => Ok(AuthScheme::None),
            _ => Err(AuthError::UnknownScheme(s.to_string())),
        }
    }
}

/// Whether a credential is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    SignedOut,
    SignedIn {
        /// False when the session cannot be refreshed once the access token expires.
        can_refresh: bool,
    },
}

impl AuthState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, AuthState::SignedIn { .. })
    }
}
