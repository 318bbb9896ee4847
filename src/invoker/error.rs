//! Error types for HTTP invocation.

use thiserror::Error;

/// Error type for transport-level failures.
///
/// The request never produced an HTTP response. Describes what went wrong
/// without dictating recovery strategy; the invoker never retries.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    ///
    /// This includes DNS resolution failures, connection refused,
    /// TLS failures and other network-level errors.
    #[error("Connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Request timed out.
    ///
    /// The server did not respond within the transport's configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The provided URL is invalid.
    ///
    /// This typically indicates a configuration error rather than
    /// a transient failure.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Error type for a single invoker call.
///
/// Every failure of [`HttpInvoker::call`] is surfaced as one of these
/// variants; the invoker never swallows errors.
///
/// [`HttpInvoker::call`]: super::HttpInvoker::call
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The request could not be completed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The backend answered with a status of 400 or above.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status.
        status: http::StatusCode,
        /// The JSON `message` field when present, the raw body otherwise.
        message: String,
        /// The raw response body.
        body: String,
    },

    /// A response that had to be JSON could not be decoded.
    #[error("Failed to decode JSON response (HTTP {status}): {source}")]
    Decode {
        /// Response status.
        status: http::StatusCode,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The request could not be built (bad path, header or payload).
    #[error("Failed to build request: {0}")]
    Encode(String),
}

impl InvokeError {
    /// Status sentinel reported when no response was received.
    pub const NO_STATUS: i32 = -1;

    /// Returns the response status, or [`Self::NO_STATUS`] when the request
    /// never produced a response.
    #[must_use]
    pub fn status(&self) -> i32 {
        match self {
            Self::Http { status, .. } | Self::Decode { status, .. } => i32::from(status.as_u16()),
            Self::Transport(_) | Self::Encode(_) => Self::NO_STATUS,
        }
    }

    /// Returns the best-effort message for HTTP errors.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
