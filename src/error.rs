use miette::{Diagnostic, Result};
use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Calendar authentication expired: {0}")]
    #[diagnostic(code(calbridge::auth_expired))]
    AuthExpired(String),

    #[error("Calendar API error: {0}")]
    #[diagnostic(code(calbridge::calendar_api))]
    CalendarApi(String),

    #[error("Invalid event data: {0}")]
    #[diagnostic(code(calbridge::data))]
    Data(String),

    #[error("Environment error: {0}")]
    #[diagnostic(code(calbridge::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(calbridge::config))]
    Config(String),

    #[error("Store error: {0}")]
    #[diagnostic(code(calbridge::store))]
    Store(String),

    #[error(transparent)]
    #[diagnostic(code(calbridge::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(calbridge::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(calbridge::other))]
    Other(String),
}

impl Error {
    /// Whether this error means the destination credential is dead and no
    /// further destination call in the current pass can succeed.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Error::AuthExpired(_))
    }

    /// Whether this error is worth another attempt under a retry policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::CalendarApi(_))
    }
}

// Implement From for TOML deserialization errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type BridgeResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create auth-expired errors
pub fn auth_expired_error(message: &str) -> Error {
    Error::AuthExpired(message.to_string())
}

/// Helper to create transient calendar API errors
pub fn calendar_api_error(message: &str) -> Error {
    Error::CalendarApi(message.to_string())
}

/// Helper to create data validation errors
pub fn data_error(message: &str) -> Error {
    Error::Data(message.to_string())
}

/// Helper to create store errors
pub fn store_error(message: &str) -> Error {
    Error::Store(message.to_string())
}

/// Helper to create other errors
#[allow(dead_code)]
pub fn other_error(message: &str) -> Error {
    Error::Other(message.to_string())
}
