//! Error types for Queen
//!
//! One taxonomy for the whole routing path. Handlers map each variant to an
//! HTTP status through [`QueenError::status_code`].

use hyper::StatusCode;

/// Main error type for Queen operations
#[derive(Debug, thiserror::Error)]
pub enum QueenError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Bad or missing signature/token. Retrying without new credentials is useless.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    /// Signing key missing or unreadable. Operator-actionable.
    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// Routing table references a node that is not registered.
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Delivery to {node} failed: {reason}")]
    DeliveryFailed { node: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueenError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::CredentialUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnknownNode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::DeliveryFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message may be shown to the caller.
    ///
    /// Configuration faults and internal errors are logged server-side only;
    /// callers see an opaque error id instead.
    pub fn is_caller_visible(&self) -> bool {
        !matches!(
            self,
            Self::UnknownNode(_) | Self::Config(_) | Self::Internal(_)
        )
    }

    /// Shorthand for a delivery failure on `node`
    pub fn delivery(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for QueenError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for QueenError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for QueenError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for QueenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::CredentialUnavailable(format!("JWT error: {}", err))
    }
}

/// Result type alias for Queen operations
pub type Result<T> = std::result::Result<T, QueenError>;
