use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use drill_core::model::{
    AnswerOutcome, DifficultyTier, ItemId, ItemPage, ResourceId, ReviewItem, SessionStats,
};

use crate::error::ApiError;
use crate::source::{AnswerSubmitter, ItemSource, PageRequest, StatsProvider};

const XP_PER_ANSWER: u32 = 10;
const XP_PER_LEVEL: u64 = 100;

#[derive(Default)]
struct MemoryState {
    items: HashMap<ResourceId, Vec<ReviewItem>>,
    hide_total_count: bool,
    failing_fetches: u32,
    fetches: Vec<(ResourceId, PageRequest)>,
    answers: Vec<(ResourceId, ItemId, DifficultyTier)>,
    total_xp: u64,
    stats_requests: usize,
}

/// In-memory stand-in for the REST collaborators, for tests and offline demos.
#[derive(Clone, Default)]
pub struct InMemorySource {
    state: Arc<Mutex<MemoryState>>,
    fetch_delay: Option<Duration>,
}

impl InMemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering, so that fetches stay in flight
    /// across an `.await`.
    #[must_use]
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_items(&self, resource_id: &ResourceId, items: impl IntoIterator<Item = ReviewItem>) {
        self.lock()
            .items
            .entry(resource_id.clone())
            .or_default()
            .extend(items);
    }

    /// Pages stop reporting `total_count`, as endpoints that cannot count cheaply do.
    pub fn hide_total_count(&self) {
        self.lock().hide_total_count = true;
    }

    /// The next `count` fetches fail with a connection error.
    pub fn fail_next_fetches(&self, count: u32) {
        self.lock().failing_fetches = count;
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches.len()
    }

    /// Page numbers requested so far, in call order.
    #[must_use]
    pub fn fetched_pages(&self) -> Vec<u32> {
        self.lock().fetches.iter().map(|(_, req)| req.page).collect()
    }

    #[must_use]
    pub fn answers(&self) -> Vec<(ResourceId, ItemId, DifficultyTier)> {
        self.lock().answers.clone()
    }

    #[must_use]
    pub fn stats_requests(&self) -> usize {
        self.lock().stats_requests
    }
}

#[async_trait]
impl ItemSource for InMemorySource {
    async fn fetch_page(
        &self,
        resource_id: &ResourceId,
        request: &PageRequest,
    ) -> Result<ItemPage, ApiError> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.fetches.push((resource_id.clone(), request.clone()));
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(ApiError::Connection("injected fetch failure".into()));
        }

        let matching: Vec<&ReviewItem> = state
            .items
            .get(resource_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| request.group.is_none() || item.group_index == request.group)
                    .collect()
            })
            .unwrap_or_default();

        let size = usize::try_from(request.page_size).unwrap_or(usize::MAX);
        let start = usize::try_from(request.page.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .saturating_mul(size);
        let end = start.saturating_add(size).min(matching.len());
        let items = matching
            .get(start..end)
            .map(|slice| slice.iter().map(|item| (*item).clone()).collect())
            .unwrap_or_default();

        Ok(ItemPage {
            items,
            total_count: if state.hide_total_count {
                None
            } else {
                u32::try_from(matching.len()).ok()
            },
            has_more: end < matching.len(),
        })
    }
}

#[async_trait]
impl AnswerSubmitter for InMemorySource {
    async fn submit_answer(
        &self,
        resource_id: &ResourceId,
        item_id: &ItemId,
        tier: DifficultyTier,
    ) -> Result<AnswerOutcome, ApiError> {
        let mut state = self.lock();
        state
            .answers
            .push((resource_id.clone(), item_id.clone(), tier));

        let level_before = state.total_xp / XP_PER_LEVEL;
        state.total_xp += u64::from(XP_PER_ANSWER);
        let level_after = state.total_xp / XP_PER_LEVEL;
        let leveled_up = level_after > level_before;

        Ok(AnswerOutcome {
            xp_gained: XP_PER_ANSWER,
            new_level: leveled_up.then(|| u32::try_from(level_after + 1).unwrap_or(u32::MAX)),
            leveled_up,
        })
    }
}

#[async_trait]
impl StatsProvider for InMemorySource {
    async fn session_stats(&self, resource_id: &ResourceId) -> Result<SessionStats, ApiError> {
        let mut state = self.lock();
        state.stats_requests += 1;
        let reviewed = state
            .answers
            .iter()
            .filter(|(resource, _, _)| resource == resource_id)
            .count();
        Ok(SessionStats {
            items_reviewed: u32::try_from(reviewed).unwrap_or(u32::MAX),
            total_xp: state.total_xp,
            level: u32::try_from(state.total_xp / XP_PER_LEVEL + 1).unwrap_or(u32::MAX),
            streak_days: 1,
        })
    }
}
