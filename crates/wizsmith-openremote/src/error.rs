//! Error types for the OpenRemote client.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for OpenRemote operations.
pub type Result<T> = std::result::Result<T, OpenRemoteError>;

/// OpenRemote client error types.
#[derive(Debug, Error)]
pub enum OpenRemoteError {
    /// Transport-level failure (unreachable host, timeout, TLS).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote answered with a non-success status.
    #[error("Remote returned error: ({0}) {1}")]
    Status(StatusCode, String),

    /// Neither grant strategy produced a token.
    #[error("authentication failed: no grant succeeded")]
    AuthFailed,

    /// An authenticated call was attempted before any token was acquired.
    #[error("not authenticated")]
    NotAuthenticated,
}

impl OpenRemoteError {
    /// True when the remote explicitly rejected our token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status(StatusCode::UNAUTHORIZED, _))
    }
}
