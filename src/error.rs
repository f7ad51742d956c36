use thiserror::Error;

/// Type alias for Result with CleanerError
pub type Result<T> = std::result::Result<T, CleanerError>;

/// Error types for the unread cleaner
#[derive(Error, Debug)]
pub enum CleanerError {
    /// No token is cached and none could be obtained silently
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The API rejected the token (HTTP 401); the token has been purged
    #[error("Authentication expired. Please re-authenticate.")]
    AuthExpired,

    /// The user cancelled or refused interactive consent
    #[error("Authentication denied: {0}")]
    AuthDenied(String),

    /// Gmail API returned a non-auth, non-success status
    #[error("Gmail API error: {status} {status_text}")]
    ApiError { status: u16, status_text: String },

    /// Response body was not valid JSON, or did not have the expected shape
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Network-related error (connection refused, reset, TLS, ...)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Outbound request did not complete within the configured timeout
    #[error("Request timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// Cutoff date could not be parsed
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// The caller cancelled the operation before it completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CleanerError {
    /// Check if the error can only be resolved by re-authenticating
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            CleanerError::NotAuthenticated
                | CleanerError::AuthExpired
                | CleanerError::AuthDenied(_)
        )
    }

    /// Build an `ApiError` from an HTTP status code
    pub fn from_status(status: hyper::StatusCode) -> Self {
        CleanerError::ApiError {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }
}

impl From<hyper_util::client::legacy::Error> for CleanerError {
    fn from(error: hyper_util::client::legacy::Error) -> Self {
        CleanerError::NetworkError(format!("Connection error: {}", error))
    }
}

impl From<hyper::Error> for CleanerError {
    fn from(error: hyper::Error) -> Self {
        CleanerError::NetworkError(error.to_string())
    }
}
