//! Shared error types for the services crate.

use thiserror::Error;

use api::ApiError;

/// Errors emitted by `PracticeCardPool`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    #[error("page fetch failed: {0}")]
    Fetch(#[from] ApiError),
    /// A background refill this caller was waiting on failed.
    #[error("background page fetch failed: {0}")]
    Refill(String),
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no items available for session")]
    Empty,
    #[error("session already completed")]
    Completed,
    #[error("session is not complete yet")]
    NotComplete,
    #[error("no item is being shown")]
    NoCurrentItem,
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Api(#[from] ApiError),
}
