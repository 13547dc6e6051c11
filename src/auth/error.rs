use thiserror::Error;

/// Failures inside the session layer itself: durable storage, token format,
/// and refresh outcomes. Never shown per request; see [`crate::error::ApiError`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("No refresh token available")]
    NoRefreshToken,
    #[error("Refresh rejected: {0}")]
    RefreshRejected(String),
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
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
