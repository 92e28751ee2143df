//! Error types for the Coinone API client

use coinone_http::RequestError;

/// Result type for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Client error types
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] RequestError),

    #[error("API error: status={code}, body={body}")]
    Api { code: u16, body: String },

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(String),
}

impl ClientError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_recoverable(),
            ClientError::Api { code, .. } => *code == 429 || *code >= 500,
            ClientError::Io(_) => true,
            ClientError::Signing(_) => false,
            ClientError::Config(_) => false,
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ClientErrorCategory {
        match self {
            ClientError::Http(_) => ClientErrorCategory::Http,
            ClientError::Api { .. } => ClientErrorCategory::Api,
            ClientError::Signing(_) => ClientErrorCategory::Signing,
            ClientError::Config(_) | ClientError::Toml(_) => ClientErrorCategory::Configuration,
            ClientError::Json(_) => ClientErrorCategory::Serialization,
            ClientError::Io(_) => ClientErrorCategory::IO,
        }
    }

    /// HTTP status of an API failure
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Client error categories for handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorCategory {
    Http,
    Api,
    Signing,
    Configuration,
    Serialization,
    IO,
}
