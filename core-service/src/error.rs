use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("API error: {0}")]
    Api(#[from] core_api::ApiError),
}

impl CoreError {
    /// True when the host should route the user to the login screen.
    pub fn requires_login(&self) -> bool {
        match self {
            CoreError::Api(e) => e.requires_login(),
            CoreError::Auth(core_auth::AuthError::NotAuthenticated) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
