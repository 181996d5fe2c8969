use thiserror::Error;

use super::device_code::PollState;

/// Errors raised by the device-grant and token exchanges.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Access denied by the user")]
    AccessDenied,
    #[error("Device code expired before authorization completed")]
    ExpiredToken,
    #[error("Authorization server error: {}", describe_server_error(.code, .description.as_deref()))]
    AuthorizationServer {
        code: String,
        description: Option<String>,
    },
    #[error("Refusing to open verification URI with scheme '{scheme}'")]
    UnsafeVerificationUri { uri: String, scheme: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    pub fn server(code: impl Into<String>, description: Option<String>) -> Self {
        Self::AuthorizationServer {
            code: code.into(),
            description,
        }
    }

    /// Terminal poller state this error corresponds to.
    pub fn poll_state(&self) -> PollState {
        match self {
            Self::AccessDenied => PollState::Denied,
            Self::ExpiredToken => PollState::Expired,
            _ => PollState::Failed,
        }
    }

    /// Transport failures are the only retryable class, and only inside the poll loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

fn describe_server_error(code: &str, description: Option<&str>) -> String {
    match description {
        Some(text) if !text.trim().is_empty() => format!("{code} ({})", text.trim()),
        _ => code.to_string(),
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(error: toml::ser::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<keyring::Error> for AuthError {
    fn from(error: keyring::Error) -> Self {
        Self::Storage(error.to_string())
    }
}
