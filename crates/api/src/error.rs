use thiserror::Error;

/// Errors surfaced by the REST collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("no access token available")]
    MissingToken,

    #[error("request rejected: unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0} cannot be used as a base url")]
    NotABaseUrl(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
