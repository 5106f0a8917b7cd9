//! Heimdall error types

/// Heimdall error types
#[derive(Debug, thiserror::Error)]
pub enum HeimdallError {
    // Origin/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("origin returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Processing errors
    #[error("metadata filter failed: {0}")]
    Filter(String),

    /// The filter pipeline rejected the whole document.
    #[error("metadata filtering produced an empty document")]
    FilteredToNothing,

    #[error("entity ID '{actual}' does not match expected entity ID '{expected}'")]
    EntityIdMismatch { expected: String, actual: String },

    // Persistent store errors
    #[error("persistent store key already exists: {0}")]
    KeyExists(String),

    #[error("persistent store path is not a regular file: {0}")]
    NotAFile(String),

    // Configuration / lifecycle
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resolver has been shut down")]
    ShutDown,
}

impl HeimdallError {
    /// Whether the error is worth retrying against the origin.
    ///
    /// Transport failures and 5xx / 429 responses are transient; everything
    /// else (bad documents, 4xx, configuration) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            HeimdallError::Http(_) => true,
            HeimdallError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            HeimdallError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for HeimdallError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => HeimdallError::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => HeimdallError::Http(err.to_string()),
        }
    }
}

/// Result type alias for Heimdall operations
pub type Result<T> = std::result::Result<T, HeimdallError>;
