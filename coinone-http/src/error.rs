//! Error types for the HTTP request layer

/// Result type for request operations
pub type RequestResult<T> = std::result::Result<T, RequestError>;

/// Request error types
#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Encoding failure: {0}")]
    Encoding(String),

    #[error("Invalid request state: {0}")]
    InvalidState(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl RequestError {
    /// Check if error is recoverable
    ///
    /// Only transport failures qualify. Nothing in this crate retries; the
    /// flag is for callers that build their own policy on top.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RequestError::Transport(_))
    }

    /// Get error category
    pub fn category(&self) -> RequestErrorCategory {
        match self {
            RequestError::InvalidUrl(_) => RequestErrorCategory::Url,
            RequestError::Transport(_) => RequestErrorCategory::Transport,
            RequestError::Encoding(_) => RequestErrorCategory::Encoding,
            RequestError::InvalidState(_) => RequestErrorCategory::State,
            RequestError::InvalidArgument(_) => RequestErrorCategory::Argument,
        }
    }

    /// Report an encoding failure as a transport failure; other errors pass through
    pub fn into_transport(self) -> Self {
        match self {
            RequestError::Encoding(message) => {
                RequestError::Transport(std::io::Error::new(std::io::ErrorKind::InvalidInput, message))
            }
            other => other,
        }
    }

    /// The underlying I/O error, if this is a transport failure
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            RequestError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Request error categories for handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorCategory {
    Url,
    Transport,
    Encoding,
    State,
    Argument,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_categories() {
        let error = RequestError::Transport(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        assert_eq!(error.category(), RequestErrorCategory::Transport);
        assert!(error.is_recoverable());
        assert_eq!(error.io_error().map(io::Error::kind), Some(io::ErrorKind::TimedOut));

        let error = RequestError::Encoding("unsupported charset: KOI8-R".to_string());
        assert_eq!(error.category(), RequestErrorCategory::Encoding);
        assert!(!error.is_recoverable());
        assert!(error.io_error().is_none());

        let error = RequestError::InvalidState("request already disconnected");
        assert_eq!(error.category(), RequestErrorCategory::State);
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_encoding_reported_as_transport() {
        let error = RequestError::Encoding("unsupported charset: KOI8-R".to_string()).into_transport();
        assert_eq!(error.category(), RequestErrorCategory::Transport);
        assert_eq!(error.io_error().map(io::Error::kind), Some(io::ErrorKind::InvalidInput));
        assert!(error.to_string().contains("KOI8-R"));

        let error = RequestError::InvalidState("request already sent").into_transport();
        assert_eq!(error.category(), RequestErrorCategory::State);
    }

    #[test]
    fn test_invalid_url_conversion() {
        let parse_error = url::Url::parse("not a url").unwrap_err();
        let error: RequestError = parse_error.into();
        assert_eq!(error.category(), RequestErrorCategory::Url);
        assert!(error.to_string().starts_with("Invalid URL"));
    }
}
