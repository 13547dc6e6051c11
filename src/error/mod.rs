//! Error types for Homebase.

pub mod classify;

pub use classify::{classify, Failure};

use strum::Display;
use thiserror::Error;

use crate::auth::AuthError;

/// Error returned to callers of the request pipeline.
///
/// The set is closed: collaborators never see raw transport failures. The
/// `Display` output is the user-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("You appear to be offline. Check your connection and try again.")]
    Offline,

    #[error("The server took too long to respond (after {timeout_ms}ms). Please try again.")]
    Timeout { timeout_ms: u64 },

    #[error("Unable to reach the server. Please try again later.")]
    Unreachable { detail: String },

    #[error("{message}")]
    ServerMessage { status: Option<u16>, message: String },

    #[error("Request failed with status {status}")]
    HttpStatus { status: u16 },

    #[error("Your session has expired. Please log in again.")]
    AuthExpired,
}

/// Machine-readable kind of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Offline,
    Timeout,
    Unreachable,
    ServerMessage,
    HttpStatus,
    AuthExpired,
}

impl ErrorKind {
    /// Only an expired session is routed through session teardown; every
    /// other kind is shown inline.
    pub fn ends_session(self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Offline => ErrorKind::Offline,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unreachable { .. } => ErrorKind::Unreachable,
            Self::ServerMessage { .. } => ErrorKind::ServerMessage,
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
            Self::AuthExpired => ErrorKind::AuthExpired,
        }
    }

    /// HTTP status attached to the error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerMessage { status, .. } => *status,
            Self::HttpStatus { status } => Some(*status),
            _ => None,
        }
    }

    /// Whether repeating the same action might succeed without user changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Offline | Self::Timeout { .. } | Self::Unreachable { .. } => true,
            Self::HttpStatus { status } => matches!(status, 429 | 500..=599),
            Self::ServerMessage { .. } | Self::AuthExpired => false,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        tracing::debug!(error = %error, "auth failure surfaced as expired session");
        Self::AuthExpired
    }
}

/// Top-level error for constructing and driving a session client.
#[derive(Error, Debug)]
pub enum HomebaseError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, HomebaseError>;
