//! Growing, paginated pool of review items.
//!
//! Items are appended page by page and never reordered or replaced. Draws are
//! uniform over the loaded items the session has not seen yet; when that set
//! runs low a refill is started in the background so the learner rarely waits.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use api::{ItemSource, PageRequest};
use drill_core::model::{ItemId, ItemPage, ResourceId, ReviewItem};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Notify;

use crate::error::PoolError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_LOW_WATERMARK: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub page_size: u32,
    /// Refill once this many (or fewer) unseen items remain loaded.
    pub low_watermark: usize,
    /// Restrict fetches to one group of the resource.
    pub group: Option<u32>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            low_watermark: DEFAULT_LOW_WATERMARK,
            group: None,
        }
    }
}

/// Result of a draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextItem {
    Item(ReviewItem),
    /// Every loaded item was seen and a page is still on its way.
    AwaitingPage,
    /// Every item of the resource was seen.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page was appended; holds the number of new items.
    Appended(usize),
    AlreadyLoading,
    NoMorePages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Idle,
    Loading,
}

/// Point-in-time view of the pool, for progress displays and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub loaded: usize,
    pub total_count: Option<u32>,
    pub next_page: u32,
    pub has_more_pages: bool,
    pub loading: bool,
    /// Why the last fetch failed; cleared by the next [`PracticeCardPool::load_more`].
    pub last_error: Option<String>,
}

struct PoolState {
    items: Vec<ReviewItem>,
    ids: HashSet<ItemId>,
    total_count: Option<u32>,
    next_page: u32,
    has_more_pages: bool,
    fetch: FetchState,
    last_error: Option<String>,
}

impl PoolState {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            ids: HashSet::new(),
            total_count: None,
            next_page: 1,
            has_more_pages: true,
            fetch: FetchState::Idle,
            last_error: None,
        }
    }
}

struct PoolInner {
    source: Arc<dyn ItemSource>,
    resource_id: ResourceId,
    config: PoolConfig,
    state: Mutex<PoolState>,
    rng: Mutex<StdRng>,
    page_loaded: Notify,
}

/// Cheap to clone; clones share the same items.
///
/// A background refill only holds a weak reference, so once every clone is
/// dropped (a restart, for instance) late pages are discarded.
#[derive(Clone)]
pub struct PracticeCardPool {
    inner: Arc<PoolInner>,
}

impl PracticeCardPool {
    /// Create an empty pool. Call [`Self::load_more`] (or use [`Self::initialize`])
    /// to fetch the first page.
    #[must_use]
    pub fn new(source: Arc<dyn ItemSource>, resource_id: ResourceId, config: PoolConfig) -> Self {
        Self::with_rng(source, resource_id, config, StdRng::from_os_rng())
    }

    /// Same as [`Self::new`] with reproducible draws.
    #[must_use]
    pub fn with_seed(
        source: Arc<dyn ItemSource>,
        resource_id: ResourceId,
        config: PoolConfig,
        seed: u64,
    ) -> Self {
        Self::with_rng(source, resource_id, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        source: Arc<dyn ItemSource>,
        resource_id: ResourceId,
        config: PoolConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                source,
                resource_id,
                config,
                state: Mutex::new(PoolState::new()),
                rng: Mutex::new(rng),
                page_loaded: Notify::new(),
            }),
        }
    }

    /// Create a pool and fetch page 1.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Fetch` if the first page cannot be loaded.
    pub async fn initialize(
        source: Arc<dyn ItemSource>,
        resource_id: ResourceId,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        let pool = Self::new(source, resource_id, config);
        pool.load_more().await?;
        Ok(pool)
    }

    #[must_use]
    pub fn resource_id(&self) -> &ResourceId {
        &self.inner.resource_id
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn loaded_len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Total item count reported by the backend, if it reports one.
    #[must_use]
    pub fn total_count(&self) -> Option<u32> {
        self.inner.lock().total_count
    }

    #[must_use]
    pub fn has_more_pages(&self) -> bool {
        self.inner.lock().has_more_pages
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.lock().fetch == FetchState::Loading
    }

    /// Error of the last failed fetch. While set, draws do not start refills.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Loaded items in load order.
    #[must_use]
    pub fn items(&self) -> Vec<ReviewItem> {
        self.inner.lock().items.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.inner.lock();
        PoolSnapshot {
            loaded: state.items.len(),
            total_count: state.total_count,
            next_page: state.next_page,
            has_more_pages: state.has_more_pages,
            loading: state.fetch == FetchState::Loading,
            last_error: state.last_error.clone(),
        }
    }

    /// Draw a random loaded item not in `seen`.
    ///
    /// When the unseen remainder is at or below the low watermark and more pages
    /// exist, a refill is started in the background; this call still answers
    /// from what is loaded right now. No refill starts after a failed fetch
    /// until [`Self::load_more`] is called.
    pub fn next_unseen(&self, seen: &HashSet<ItemId>) -> NextItem {
        let (next, refill) = {
            let mut state = self.inner.lock();
            let candidates: Vec<&ReviewItem> = state
                .items
                .iter()
                .filter(|item| !seen.contains(&item.id))
                .collect();
            let remaining = candidates.len();

            let next = if candidates.is_empty() {
                if state.has_more_pages {
                    NextItem::AwaitingPage
                } else {
                    NextItem::Exhausted
                }
            } else {
                let index = self.inner.rng().random_range(0..remaining);
                NextItem::Item(candidates[index].clone())
            };

            let refill = if remaining <= self.inner.config.low_watermark
                && state.last_error.is_none()
            {
                self.inner.begin_fetch(&mut state)
            } else {
                None
            };
            (next, refill)
        };

        if let Some(request) = refill {
            self.spawn_refill(request);
        }
        next
    }

    /// Like [`Self::next_unseen`], but waits for a page instead of returning
    /// [`NextItem::AwaitingPage`].
    ///
    /// # Errors
    ///
    /// Returns `PoolError` when the page being waited for fails to load, or
    /// `PoolError::Refill` when an earlier fetch failed and was not retried
    /// with [`Self::load_more`].
    pub async fn next_unseen_or_wait(&self, seen: &HashSet<ItemId>) -> Result<NextItem, PoolError> {
        loop {
            // Registered before the check so a page landing in between still wakes us.
            let loaded = self.inner.page_loaded.notified();
            match self.next_unseen(seen) {
                NextItem::AwaitingPage => {}
                other => return Ok(other),
            }

            let (loading, failed) = {
                let state = self.inner.lock();
                (state.fetch == FetchState::Loading, state.last_error.clone())
            };
            if !loading {
                if let Some(err) = failed {
                    return Err(PoolError::Refill(err));
                }
                // No refill could be started in the background; fetch inline.
                self.load_more().await?;
                continue;
            }

            tracing::debug!(resource_id = %self.inner.resource_id, "waiting for next page");
            loaded.await;
            let failed = {
                let state = self.inner.lock();
                match state.fetch {
                    FetchState::Idle => state.last_error.clone(),
                    FetchState::Loading => None,
                }
            };
            if let Some(err) = failed {
                return Err(PoolError::Refill(err));
            }
        }
    }

    /// Fetch the next page and append it.
    ///
    /// A call while another fetch is in flight does nothing. Dropping the
    /// returned future before it resolves releases the fetch slot.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Fetch` when the page cannot be loaded; the items are
    /// left as they were and the error is kept in [`PoolSnapshot::last_error`].
    pub async fn load_more(&self) -> Result<LoadOutcome, PoolError> {
        let request = {
            let mut state = self.inner.lock();
            if state.fetch == FetchState::Loading {
                return Ok(LoadOutcome::AlreadyLoading);
            }
            match self.inner.begin_fetch(&mut state) {
                Some(request) => request,
                None => return Ok(LoadOutcome::NoMorePages),
            }
        };
        let guard = FetchGuard::new(&self.inner);
        let result = self
            .inner
            .source
            .fetch_page(&self.inner.resource_id, &request)
            .await;
        guard.disarm();
        self.inner.finish_fetch(&request, result)
    }

    fn spawn_refill(&self, request: PageRequest) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime for background refill; deferring");
            self.inner.abandon_fetch();
            return;
        };

        let weak: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let source = Arc::clone(&self.inner.source);
        let resource_id = self.inner.resource_id.clone();
        tracing::debug!(%resource_id, page = request.page, "background refill");
        runtime.spawn(async move {
            let result = source.fetch_page(&resource_id, &request).await;
            let Some(inner) = weak.upgrade() else {
                tracing::debug!(%resource_id, page = request.page, "pool gone; discarding page");
                return;
            };
            if let Err(err) = inner.finish_fetch(&request, result) {
                tracing::warn!(%err, %resource_id, "background refill failed");
            }
        });
    }
}

/// Returns the pool to `Idle` if an inline fetch is dropped mid-flight.
struct FetchGuard<'a> {
    inner: &'a PoolInner,
    armed: bool,
}

impl<'a> FetchGuard<'a> {
    fn new(inner: &'a PoolInner) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(resource_id = %self.inner.resource_id, "page fetch cancelled");
            self.inner.abandon_fetch();
        }
    }
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `Idle` to `Loading` and return the request to issue, if a fetch is due.
    fn begin_fetch(&self, state: &mut PoolState) -> Option<PageRequest> {
        if state.fetch != FetchState::Idle || !state.has_more_pages {
            return None;
        }
        state.fetch = FetchState::Loading;
        state.last_error = None;
        Some(PageRequest {
            page: state.next_page,
            page_size: self.config.page_size,
            group: self.config.group,
        })
    }

    fn abandon_fetch(&self) {
        self.lock().fetch = FetchState::Idle;
        self.page_loaded.notify_waiters();
    }

    fn finish_fetch(
        &self,
        request: &PageRequest,
        result: Result<ItemPage, api::ApiError>,
    ) -> Result<LoadOutcome, PoolError> {
        let outcome = {
            let mut state = self.lock();
            state.fetch = FetchState::Idle;
            match result {
                Ok(page) => {
                    let received = page.items.len();
                    let mut appended = 0;
                    for item in page.items {
                        if state.ids.insert(item.id.clone()) {
                            state.items.push(item);
                            appended += 1;
                        }
                    }
                    if appended < received {
                        tracing::debug!(
                            page = request.page,
                            duplicates = received - appended,
                            "skipped items already in the pool"
                        );
                    }
                    if page.total_count.is_some() {
                        state.total_count = page.total_count;
                    }
                    state.next_page = request.page.saturating_add(1);
                    // An empty page ends pagination even if the backend claims otherwise.
                    state.has_more_pages = page.has_more && received > 0;
                    Ok(LoadOutcome::Appended(appended))
                }
                Err(err) => {
                    tracing::warn!(%err, page = request.page, "page fetch failed");
                    state.last_error = Some(err.to_string());
                    Err(PoolError::Fetch(err))
                }
            }
        };
        self.page_loaded.notify_waiters();
        outcome
    }
}
