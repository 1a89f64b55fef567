pub use core_auth::first_message;

use core_auth::{FailureKind, RequestFailure};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

const CONNECTIVITY_MESSAGE: &str =
    "Unable to reach the server. Please check your connection and try again.";
const UNEXPECTED_RESPONSE_MESSAGE: &str = "Unexpected response from the server. Please try again.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 400 with per-field messages, first message of each field.
    #[error("Validation failed: {}", join_field_errors(errors))]
    FieldErrors {
        status: u16,
        errors: BTreeMap<String, String>,
    },

    #[error("{message}")]
    Message {
        kind: FailureKind,
        status: Option<u16>,
        message: String,
    },

    #[error("Unexpected response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("Secure storage unavailable: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn message(kind: FailureKind, status: Option<u16>, message: impl Into<String>) -> Self {
        ApiError::Message {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn decode(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        ApiError::Decode {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::FieldErrors { .. } => FailureKind::Validation,
            ApiError::Message { kind, .. } => *kind,
            ApiError::Decode { .. } | ApiError::Storage(_) => FailureKind::Http,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::FieldErrors { status, .. } => Some(*status),
            ApiError::Message { status, .. } => *status,
            ApiError::Decode { .. } | ApiError::Storage(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == FailureKind::NotFound
    }

    /// True when the host should send the user back to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::MissingCredential | FailureKind::SessionExpired
        )
    }

    /// Message for a given field, if the server rejected it.
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            ApiError::FieldErrors { errors, .. } => errors.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// The one string a UI banner should show for this error.
    pub fn banner_message(&self) -> String {
        match self {
            ApiError::FieldErrors { errors, .. } => errors
                .values()
                .next()
                .cloned()
                .unwrap_or_else(|| UNEXPECTED_RESPONSE_MESSAGE.to_string()),
            ApiError::Message {
                kind: FailureKind::Transport,
                ..
            } => CONNECTIVITY_MESSAGE.to_string(),
            ApiError::Message { message, .. } => message.clone(),
            ApiError::Decode { .. } | ApiError::Storage(_) => UNEXPECTED_RESPONSE_MESSAGE.to_string(),
        }
    }
}

impl From<RequestFailure> for ApiError {
    fn from(failure: RequestFailure) -> Self {
        if failure.kind == FailureKind::Validation {
            if let Some(errors) = failure.body.as_ref().and_then(field_errors) {
                return ApiError::FieldErrors {
                    status: failure.status.unwrap_or(400),
                    errors,
                };
            }
        }

        ApiError::Message {
            kind: failure.kind,
            status: failure.status,
            message: failure.message,
        }
    }
}

/// Per-field messages from a 400 body; `None` if there are none.
pub fn field_errors(body: &Value) -> Option<BTreeMap<String, String>> {
    let errors: BTreeMap<String, String> = body
        .as_object()?
        .iter()
        .filter(|(field, _)| field.as_str() != "detail")
        .filter_map(|(field, value)| Some((field.clone(), first_message(value)?)))
        .collect();

    (!errors.is_empty()).then_some(errors)
}

fn join_field_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failure(kind: FailureKind, status: Option<u16>, body: Option<Value>) -> RequestFailure {
        RequestFailure {
            kind,
            status,
            body,
            message: "server said no".to_string(),
        }
    }

    #[test]
    fn test_validation_body_becomes_field_errors() {
        let err: ApiError = failure(
            FailureKind::Validation,
            Some(400),
            Some(json!({
                "dose_date": ["This field is required.", "Second"],
                "vaccine": "Invalid pk.",
                "count": 3
            })),
        )
        .into();

        assert_eq!(err.field("dose_date"), Some("This field is required."));
        assert_eq!(err.field("vaccine"), Some("Invalid pk."));
        assert_eq!(err.field("count"), None);
        assert_eq!(err.kind(), FailureKind::Validation);
        assert_eq!(err.banner_message(), "This field is required.");
    }

    #[test]
    fn test_validation_with_only_detail_is_message() {
        let err: ApiError = failure(
            FailureKind::Validation,
            Some(400),
            Some(json!({ "detail": "Bad request" })),
        )
        .into();

        assert!(matches!(err, ApiError::Message { .. }));
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_requires_login() {
        let expired: ApiError = RequestFailure::session_expired().into();
        let missing: ApiError = RequestFailure::missing_credential().into();
        let not_found: ApiError = failure(FailureKind::NotFound, Some(404), None).into();

        assert!(expired.requires_login());
        assert!(missing.requires_login());
        assert!(!not_found.requires_login());
        assert!(not_found.is_not_found());
        assert_eq!(
            missing.banner_message(),
            "Authentication token is missing. Please log in again."
        );
    }

    #[test]
    fn test_transport_banner_is_connectivity_message() {
        let err: ApiError = failure(FailureKind::Transport, None, None).into();
        assert_eq!(err.banner_message(), CONNECTIVITY_MESSAGE);
        assert_eq!(err.to_string(), "server said no");
    }

    #[test]
    fn test_field_errors_accept_bare_strings() {
        let errors = field_errors(&json!({
            "detail": "ignored",
            "email": "Enter a valid email address.",
            "phone_number": ["This field is required.", "Too short."],
            "count": 3
        }))
        .unwrap();

        assert_eq!(errors.len(), 2);
        assert_eq!(errors["email"], "Enter a valid email address.");
        assert_eq!(errors["phone_number"], "This field is required.");
    }
}
