#![forbid(unsafe_code)]

pub mod auth;
pub mod error;
pub mod http;
pub mod memory;
pub mod source;

pub use auth::{SharedTokenStore, StaticTokenProvider, TokenProvider};
pub use error::ApiError;
pub use http::{HttpApi, HttpApiConfig};
pub use memory::InMemorySource;
pub use source::{AnswerSubmitter, ItemSource, PageRequest, StatsProvider};
