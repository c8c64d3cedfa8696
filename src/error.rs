//! Error types for the client layer.

use std::time::Duration;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, HttpClientError>;

/// Errors produced while resolving options or executing a request.
///
/// Every condition here is returned as a value; nothing in this taxonomy
/// terminates the calling process.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// An option name outside the recognized schema. Validation is closed:
    /// unrecognized names are always rejected.
    #[error("unknown option `{key}`")]
    UnknownOption {
        /// The rejected option name.
        key: String,
    },

    /// A recognized option carrying a malformed value.
    #[error("invalid value for option `{key}`: {reason}")]
    InvalidOption {
        /// The offending option name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The named circuit breaker is open; the transport was not invoked.
    #[error("circuit breaker `{breaker}` is open, request rejected")]
    CircuitOpen {
        /// Registry key of the tripped breaker.
        breaker: String,
    },

    /// No connection could be checked out of the pool in time.
    #[error("connection pool checkout timed out after {0:?}")]
    PoolTimeout(Duration),

    /// No response arrived within the receive timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// The response body could not be decoded as JSON when decoding was
    /// requested.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// Invalid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Request building error.
    #[error("failed to build request: {0}")]
    RequestBuild(String),

    /// Any other engine fault, passed through as a string rendering.
    #[error("transport error: {0}")]
    Transport(String),
}

impl HttpClientError {
    /// Check if this error is retryable under the safe policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolTimeout(_) | Self::Timeout(_) | Self::Connection(_)
        )
    }

    /// Check if this is a timeout of either kind.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::PoolTimeout(_) | Self::Timeout(_))
    }

    /// Check if this error was raised during option validation, before any
    /// network activity.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownOption { .. } | Self::InvalidOption { .. } | Self::InvalidUrl(_)
        )
    }
}

impl From<url::ParseError> for HttpClientError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidUrl(error.to_string())
    }
}
