//! Error types for the Compute Engine client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ComputeError>;

/// Errors that can occur when talking to the Compute Engine API
#[derive(Debug, Error)]
pub enum ComputeError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// A zone operation finished with an error
    #[error("Operation {operation} failed ({code}): {message}")]
    OperationFailed {
        operation: String,
        code: String,
        message: String,
    },

    /// The zone has no capacity left for the requested resources
    #[error("Zone resources exhausted: {0}")]
    ResourcesExhausted(String),

    /// Invalid request built by the caller
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ComputeError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if the API asked us to slow down (429)
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::ApiError { status: 429, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }

    /// Check if retrying the same request may succeed
    ///
    /// Network failures, 5xx responses and rate limiting are transient;
    /// everything else is a definite answer from the API.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::ApiError { .. } => self.is_rate_limited() || self.is_server_error(),
            _ => false,
        }
    }
}
