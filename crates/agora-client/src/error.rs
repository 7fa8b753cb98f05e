//! Error types for the resource client

use thiserror::Error;

/// Resource client error
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Resource not found
    #[error("Not Found: {0}")]
    NotFound(String),

    /// Caller lacks the permission for this request (401/403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A no-fork post would branch the version chain
    #[error("Version {path} is no longer the head of its item")]
    Fork { path: String },

    /// Server-side uniqueness constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Build an error from a non-success status and response body
    pub fn from_status(status: u16, path: &str, body: String) -> Self {
        let lower = body.to_lowercase();
        match status {
            404 => ClientError::NotFound(path.to_string()),
            401 | 403 => ClientError::Forbidden(path.to_string()),
            409 => ClientError::Conflict(body),
            400 if lower.contains("already exists") => ClientError::Conflict(body),
            400 if lower.contains("fork") => ClientError::Fork {
                path: path.to_string(),
            },
            _ => ClientError::Server {
                status,
                message: body,
            },
        }
    }

    /// Whether this is the not-found case
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Result type for resource client operations
pub type Result<T> = std::result::Result<T, ClientError>;
