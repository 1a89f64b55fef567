//! Account management (`auth/users/`).
//!
//! Registration, activation and password reset are anonymous; everything
//! about the current user goes through the executor.

use crate::client::{encode, Access, ApiClient};
use crate::error::{first_message, ApiError, Result};
use bridge_traits::http::HttpMethod;
use core_auth::FailureKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const USERS: &str = "auth/users/";
const ME: &str = "auth/users/me/";
const SET_PASSWORD: &str = "auth/users/set_password/";
const RESET_PASSWORD: &str = "auth/users/reset_password/";
const RESET_PASSWORD_CONFIRM: &str = "auth/users/reset_password_confirm/";
const ACTIVATION: &str = "auth/users/activation/";
const CHECK_EMAIL: &str = "check-email/";

const REGISTRATION_FAILED: &str = "Registration failed. Please try again.";
const CURRENT_PASSWORD_INCORRECT: &str = "Current password is incorrect";
const NEW_PASSWORD_INVALID: &str = "New password is invalid. Please try a different password.";
const PASSWORD_UPDATE_FAILED: &str = "Failed to update password. Please try again.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.phone_number.clone().unwrap_or_default()
        } else {
            name
        }
    }
}

#[derive(Clone, PartialEq, Serialize)]
pub struct NewUser {
    pub phone_number: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("phone_number", &self.phone_number)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct PasswordChange<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

#[derive(Serialize)]
struct PasswordResetConfirm<'a> {
    uid: &'a str,
    token: &'a str,
    new_password: &'a str,
    re_new_password: &'a str,
}

pub struct AccountApi {
    client: Arc<ApiClient>,
}

impl AccountApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn me(&self) -> Result<User> {
        self.client.get(ME, Access::Authenticated).await
    }

    pub async fn update_me<P: Serialize + ?Sized>(&self, user: &P) -> Result<User> {
        self.client.put(ME, user).await
    }

    /// Creates an inactive account; the server mails an activation link.
    #[instrument(skip_all)]
    pub async fn register(&self, user: &NewUser) -> Result<User> {
        let result = self.client.post(USERS, Access::Anonymous, user).await;
        result.map_err(|e| {
            if e.kind() != FailureKind::Validation {
                return e;
            }
            let body = registration_failure_body(&e);
            ApiError::message(
                FailureKind::Validation,
                e.status(),
                registration_error_message(body.as_ref()),
            )
        })
    }

    #[instrument(skip_all)]
    pub async fn set_password(&self, current_password: &str, new_password: &str) -> Result<()> {
        let change = PasswordChange {
            current_password,
            new_password,
        };
        match self
            .client
            .send(
                HttpMethod::Post,
                SET_PASSWORD,
                Access::Authenticated,
                Some(encode(SET_PASSWORD, &change)?),
            )
            .await
        {
            Ok(_) => {
                info!("Password updated");
                Ok(())
            }
            Err(e) if e.requires_login() => Err(e),
            Err(e) => {
                warn!(status = ?e.status(), "Password update rejected");
                Err(ApiError::message(e.kind(), e.status(), password_error_message(&e)))
            }
        }
    }

    pub async fn reset_password(&self, email: &str) -> Result<()> {
        self.client
            .send(
                HttpMethod::Post,
                RESET_PASSWORD,
                Access::Anonymous,
                Some(encode(RESET_PASSWORD, &json!({ "email": email }))?),
            )
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, token, new_password, re_new_password))]
    pub async fn reset_password_confirm(
        &self,
        uid: &str,
        token: &str,
        new_password: &str,
        re_new_password: &str,
    ) -> Result<()> {
        let confirm = PasswordResetConfirm {
            uid,
            token,
            new_password,
            re_new_password,
        };
        self.client
            .send(
                HttpMethod::Post,
                RESET_PASSWORD_CONFIRM,
                Access::Anonymous,
                Some(encode(RESET_PASSWORD_CONFIRM, &confirm)?),
            )
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, token))]
    pub async fn activate(&self, uid: &str, token: &str) -> Result<()> {
        self.client
            .send(
                HttpMethod::Post,
                ACTIVATION,
                Access::Anonymous,
                Some(encode(ACTIVATION, &json!({ "uid": uid, "token": token }))?),
            )
            .await
            .map(|_| ())
    }

    /// Whether an account exists for `email`.
    ///
    /// Only a 404 means "no"; any other failure reports `true` so a reset
    /// request is still attempted.
    pub async fn check_email(&self, email: &str) -> Result<bool> {
        let result = self
            .client
            .send(
                HttpMethod::Post,
                CHECK_EMAIL,
                Access::Anonymous,
                Some(encode(CHECK_EMAIL, &json!({ "email": email }))?),
            )
            .await;

        match result {
            Ok(body) => Ok(body.get("exists").and_then(Value::as_bool).unwrap_or(false)),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => {
                warn!(error = %e, "Email check failed, assuming the account exists");
                Ok(true)
            }
        }
    }
}

fn registration_failure_body(error: &ApiError) -> Option<Value> {
    match error {
        ApiError::FieldErrors { errors, .. } => Some(Value::Object(
            errors
                .iter()
                .map(|(field, message)| (field.clone(), Value::String(message.clone())))
                .collect(),
        )),
        ApiError::Message { message, .. } => Some(json!({ "detail": message })),
        _ => None,
    }
}

/// Message for a rejected registration.
///
/// Known fields win in a fixed order; otherwise every message is joined.
pub fn registration_error_message(body: Option<&Value>) -> String {
    let Some(fields) = body.and_then(Value::as_object) else {
        return REGISTRATION_FAILED.to_string();
    };

    if let Some(message) = ["phone_number", "password", "email", "non_field_errors"]
        .iter()
        .find_map(|field| first_message(fields.get(*field)?))
    {
        return message;
    }

    let joined = fields
        .values()
        .flat_map(|value| match value {
            Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            Value::String(s) => vec![s.clone()],
            _ => Vec::new(),
        })
        .collect::<Vec<_>>()
        .join(", ");

    if joined.is_empty() {
        REGISTRATION_FAILED.to_string()
    } else {
        joined
    }
}

fn password_error_message(error: &ApiError) -> String {
    if error.field("current_password").is_some() {
        CURRENT_PASSWORD_INCORRECT.to_string()
    } else if error.field("new_password").is_some() {
        NEW_PASSWORD_INVALID.to_string()
    } else {
        PASSWORD_UPDATE_FAILED.to_string()
    }
}
