//! Error types for the Agora SDK

use agora_client::ClientError;
use thiserror::Error;

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;

/// SDK error types
#[derive(Error, Debug)]
pub enum SdkError {
    /// Nothing matched; for a rating lookup this means "not rated yet"
    #[error("Not Found")]
    NotFound,

    /// Another operation of the same widget is still in flight
    #[error("locked")]
    Locked,

    /// The server refused the request for the current user
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource API failure
    #[error("Resource client error: {0}")]
    Client(ClientError),

    /// Server push channel failure
    #[error("Push channel error: {0}")]
    Push(String),

    /// Form content rejected before sending
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation needs state the component does not have
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SdkError {
    /// The expected "nothing there yet" case, as opposed to a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, SdkError::NotFound)
    }
}

impl From<ClientError> for SdkError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound(_) => SdkError::NotFound,
            ClientError::Forbidden(path) => SdkError::Forbidden(path),
            other => SdkError::Client(other),
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Client(ClientError::Json(err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SdkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SdkError::Push(err.to_string())
    }
}
