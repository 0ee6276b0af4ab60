use thiserror::Error;

/// A single failed validation check, tied to the config field it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Unified error type for the pageviews client.
#[derive(Error, Debug, Clone)]
pub enum PageviewsError {
    /// No counter row exists for the slug
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication against the views API failed
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    TimedOut(String),

    /// Network error - covers connection refused, server disconnected, etc.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// API returned error with HTTP status code
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration failed validation
    #[error("Validation error: {}", .0.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
    ValidationError(Vec<ValidationIssue>),

    /// Resource temporarily unavailable
    #[error("Resource temporarily unavailable: {0}")]
    NotReady(String),

    /// Parse/serialization error
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl PageviewsError {
    /// Check if this error is transient and retryable
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PageviewsError::TimedOut(_)
                | PageviewsError::NetworkError(_)
                | PageviewsError::NotReady(_)
                | PageviewsError::ApiError {
                    status: 408 | 429 | 502 | 503 | 504,
                    ..
                }
        )
    }

    /// Check if this error indicates the server is unavailable
    pub fn is_server_unavailable(&self) -> bool {
        matches!(
            self,
            PageviewsError::TimedOut(_) | PageviewsError::NetworkError(_)
        )
    }
}

// === Conversion Implementations ===

macro_rules! impl_from_error {
    ($err_type:ty, $arm:pat => $body:expr) => {
        impl From<$err_type> for PageviewsError {
            fn from(err: $err_type) -> Self {
                match err {
                    $arm => $body,
                }
            }
        }
    };
}

impl_from_error!(std::io::Error, e => match e.kind() {
    std::io::ErrorKind::NotFound => PageviewsError::NotFound(e.to_string()),
    std::io::ErrorKind::PermissionDenied => PageviewsError::PermissionDenied(e.to_string()),
    std::io::ErrorKind::TimedOut => PageviewsError::TimedOut(e.to_string()),
    std::io::ErrorKind::InvalidInput => PageviewsError::InvalidArgument(e.to_string()),
    _ => PageviewsError::IoError(e.to_string()),
});

impl_from_error!(reqwest::Error, e => if e.is_timeout() {
    PageviewsError::TimedOut(e.to_string())
} else if e.is_connect() {
    PageviewsError::NetworkError(format!("Server disconnected: {}", e))
} else if e.is_request() {
    PageviewsError::NetworkError(e.to_string())
} else if e.is_decode() {
    PageviewsError::ParseError(e.to_string())
} else {
    PageviewsError::IoError(format!("HTTP error: {}", e))
});

impl_from_error!(serde_json::Error, e => PageviewsError::ParseError(e.to_string()));
impl_from_error!(toml::de::Error, e => PageviewsError::ParseError(e.to_string()));

/// Result type alias for operations that can fail with PageviewsError.
pub type PageviewsResult<T> = Result<T, PageviewsError>;
