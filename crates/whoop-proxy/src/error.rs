//! Error types for the WHOOP OAuth proxy.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

/// Errors from the outbound HTTP client layer.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, timeout, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// Non-2xx response from the provider or resource server
    #[error("Unexpected status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },

    /// JSON parsing error
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ClientError {
    /// Create a status error.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status { status, message: message.into() }
    }

    /// HTTP status carried by this error, if the server answered at all.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Middleware(reqwest_middleware::Error::Reqwest(e)) => {
                e.status().map(|s| s.as_u16())
            }
            _ => None,
        }
    }

    /// Returns true if the request timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout(),
            Self::Middleware(reqwest_middleware::Error::Reqwest(e)) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Errors from token persistence.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Filesystem error
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Update for a record that was never created
    #[error("Token record {0} not found")]
    NotFound(uuid::Uuid),
}

/// Errors from the token lifecycle, the authorization flow and the resource proxy.
///
/// `Clone` so that a single refresh outcome can be handed to every caller
/// waiting on it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Returned `state` does not match the outstanding nonce
    #[error("Invalid state parameter")]
    InvalidState,

    /// Authorization code exchange was rejected or the provider was unreachable
    #[error("Authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    /// Refresh grant was rejected or the provider was unreachable
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// No usable token exists; a fresh authorization flow is required
    #[error("No valid token available")]
    NoToken,

    /// Resource server call failed after successful authentication
    #[error(
        "Upstream request failed{}: {message}",
        .status.map(|s| format!(" ({s})")).unwrap_or_default()
    )]
    UpstreamFailed {
        /// Upstream HTTP status, when the server answered
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// Resource call aborted because no access token could be obtained
    #[error("Unauthenticated: {0}")]
    Unauthenticated(Box<AuthError>),

    /// Token persistence failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Create an exchange failure.
    #[must_use]
    pub fn exchange_failed(message: impl Into<String>) -> Self {
        Self::ExchangeFailed(message.into())
    }

    /// Create a refresh failure.
    #[must_use]
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::RefreshFailed(message.into())
    }

    /// Map a transport error from a resource call.
    #[must_use]
    pub fn upstream(err: &ClientError) -> Self {
        let message = match err {
            ClientError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self::UpstreamFailed { status: err.status_code(), message }
    }

    /// Returns true if the caller caused the failure (HTTP 400 territory).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidState)
    }

    /// Upstream status carried by this error, if any.
    #[must_use]
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamFailed { status, .. } => *status,
            Self::Unauthenticated(inner) => inner.upstream_status(),
            _ => None,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for token, flow and proxy operations.
pub type AuthResult<T> = Result<T, AuthError>;
