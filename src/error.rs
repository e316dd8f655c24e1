//! Error Handling Module
//!
//! One error type, [`GatewayError`], is shared by the broker, the producer
//! handshake and every provider adapter.
//!
//! # Example
//!
//! ```rust
//! use infergate::error::{ErrorCategory, GatewayError};
//!
//! let error = GatewayError::upstream(404, "Not found");
//! assert_eq!(error.category(), ErrorCategory::Client);
//! assert!(!error.is_retryable());
//! ```

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// A required configuration key is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The provider answered with a non-success status.
    #[error("Upstream request failed ({status}): {message}")]
    UpstreamRequestError { status: u16, message: String },

    /// Transport-level failure talking to the provider.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The streaming producer never published a request id.
    #[error("Request id was not assigned within {waited:?}")]
    RequestIdTimeout { waited: Duration },

    /// Caller input that no adapter path accepts.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A provider payload could not be decoded.
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("JSON error: {0}")]
    JsonError(String),

    /// A stream ended with a failure reason.
    #[error("Stream error: {0}")]
    StreamError(String),

    /// No channel is registered under the given request id.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Coarse grouping used for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad configuration or caller input; never retried.
    Client,
    /// Provider-side failures (5xx, rate limits).
    Server,
    /// Transport failures.
    Network,
    /// Handshake or stream lifecycle failures.
    Stream,
    /// Decoding failures.
    Parsing,
    Internal,
}

impl GatewayError {
    /// Build an upstream error from a status code and message.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::UpstreamRequestError {
            status,
            message: message.into(),
        }
    }

    /// Shorthand for a missing configuration key.
    pub fn missing_key(key: &str) -> Self {
        Self::ConfigurationError(format!("missing required key `{key}`"))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationError(_)
            | Self::InvalidInput(_)
            | Self::NotFound(_)
            | Self::UnsupportedOperation(_) => ErrorCategory::Client,
            Self::UpstreamRequestError { status, .. } => {
                if *status == 429 || *status >= 500 {
                    ErrorCategory::Server
                } else {
                    ErrorCategory::Client
                }
            }
            Self::HttpError(_) => ErrorCategory::Network,
            Self::RequestIdTimeout { .. } | Self::StreamError(_) => ErrorCategory::Stream,
            Self::ParseError(_) | Self::JsonError(_) => ErrorCategory::Parsing,
            Self::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a retry of the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamRequestError { status, .. } => {
                matches!(status, 408 | 409 | 429) || *status >= 500
            }
            Self::HttpError(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::upstream(status.as_u16(), err.to_string()),
            None => Self::HttpError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: GatewayError = json_err.into();
        assert!(matches!(err, GatewayError::JsonError(_)));
    }

    #[test]
    fn upstream_retryability_follows_status() {
        assert!(GatewayError::upstream(500, "boom").is_retryable());
        assert!(GatewayError::upstream(429, "slow down").is_retryable());
        assert!(!GatewayError::upstream(400, "bad").is_retryable());
        assert_eq!(
            GatewayError::upstream(503, "x").category(),
            ErrorCategory::Server
        );
    }

    #[test]
    fn lifecycle_errors_are_not_retried() {
        let err = GatewayError::RequestIdTimeout {
            waited: Duration::from_secs(10),
        };
        assert_eq!(err.category(), ErrorCategory::Stream);
        assert!(!err.is_retryable());
        assert!(!GatewayError::missing_key("saas.api_key").is_retryable());
    }
}
