//! Error types for backend API calls.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`HttpClient`](crate::HttpClient) implementations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend rejected our credentials (HTTP 401).
    #[error("Unauthorized (HTTP 401)")]
    Unauthorized,

    /// Authenticated, but not allowed (HTTP 403).
    #[error("Forbidden (HTTP 403)")]
    Forbidden,

    /// The endpoint does not exist (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("Server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request did not complete in time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server could not be reached.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The body was not valid JSON.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be built or sent.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// Whether retrying later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Timeout(_) | ClientError::Connection(_) => true,
            ClientError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
