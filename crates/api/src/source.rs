use async_trait::async_trait;
use drill_core::model::{AnswerOutcome, DifficultyTier, ItemId, ItemPage, ResourceId, SessionStats};

use crate::error::ApiError;

/// Arguments of a single page fetch. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
    pub group: Option<u32>,
}

/// Paginated source of review items.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Fetch one page of items for a resource.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` when the request fails or the response cannot be decoded.
    async fn fetch_page(
        &self,
        resource_id: &ResourceId,
        request: &PageRequest,
    ) -> Result<ItemPage, ApiError>;
}

/// Records a learner's answer and reports the XP it earned.
#[async_trait]
pub trait AnswerSubmitter: Send + Sync {
    /// Submit the answer for one item.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` when the request fails.
    async fn submit_answer(
        &self,
        resource_id: &ResourceId,
        item_id: &ItemId,
        tier: DifficultyTier,
    ) -> Result<AnswerOutcome, ApiError>;
}

/// Supplies the summary shown when a practice session ends.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Fetch summary statistics for a resource.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` when the request fails.
    async fn session_stats(&self, resource_id: &ResourceId) -> Result<SessionStats, ApiError>;
}
