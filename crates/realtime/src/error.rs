//! Error types for the realtime stack.

use drill_core::EventError;
use thiserror::Error;

/// Failures reported by a [`ProgressTransport`](crate::transport::ProgressTransport).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// The server refused the bearer credential. Never retried.
    #[error("credential rejected: {0}")]
    Unauthorized(String),
    /// Anything transient: refused connection, reset, timeout.
    #[error("network error: {0}")]
    Network(String),
}

/// Authentication failures surfaced through the observable connection status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionError {
    #[error("no access token available")]
    MissingCredential,
    #[error("access token rejected: {0}")]
    Rejected(String),
}

/// Reasons an inbound frame is dropped.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid event: {0}")]
    Invalid(#[from] EventError),
}
