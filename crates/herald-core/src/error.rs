use thiserror::Error;

/// Application-wide error types for Herald.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request completed with a non-success status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request or page operation timed out.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// Page navigation failed.
    #[error("Navigation to {url} failed: {message}")]
    NavigationError { url: String, message: String },

    /// A required element was not present on the page.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Browser process or CDP connection failure.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// The CMS refused the credentials. Never retried.
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// The downloaded image is a known rate-limit placeholder.
    #[error("Placeholder image rejected (hash {hash})")]
    PlaceholderImage { hash: String },

    /// The response looked wrong (empty body, unexpected page) and is worth another try.
    #[error("Unexpected response: {0}")]
    Anomaly(String),

    /// A retried operation failed on every attempt.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: Box<AppError>,
    },

    /// Reading or writing the fingerprint registry failed.
    #[error("Registry error: {0}")]
    RegistryError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::NavigationError { .. }
            | AppError::Anomaly(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("HTTP 429")
                    || msg.contains("HTTP 5")
                    || msg.contains("timeout")
                    || msg.contains("connect")
                    || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if this error must abort the whole publish attempt.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::AuthRejected(_) | AppError::BrowserError(_) => true,
            AppError::RetriesExhausted { last, .. } => last.is_fatal(),
            _ => false,
        }
    }
}
