use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The server refused the login; the message is ready to show the user.
    #[error("{0}")]
    LoginRejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Unknown authorization scheme: {0}")]
    UnknownScheme(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Serialization failed ({context}): {source}")]
    SerializationFailed {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Not authenticated")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, AuthError>;
