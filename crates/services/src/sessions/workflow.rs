use std::sync::Arc;

use api::{AnswerSubmitter, ItemSource, StatsProvider};
use drill_core::model::{AnswerOutcome, DifficultyTier, ItemId, ResourceId, ReviewItem};

use super::completion::CompletionSignal;
use super::pool::{LoadOutcome, NextItem, PoolConfig, PracticeCardPool};
use super::progress::SessionProgress;
use super::service::PracticeSession;
use super::view::SessionSummary;
use crate::Clock;
use crate::error::SessionError;

/// Result of answering a single item in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAnswerResult {
    pub item_id: ItemId,
    pub outcome: AnswerOutcome,
    pub progress: SessionProgress,
    pub is_complete: bool,
    /// Present once the session completed and its statistics were fetched.
    pub summary: Option<SessionSummary>,
}

/// Orchestrates session start, drawing, answering and completion.
#[derive(Clone)]
pub struct SessionLoopService {
    clock: Clock,
    items: Arc<dyn ItemSource>,
    answers: Arc<dyn AnswerSubmitter>,
    stats: Arc<dyn StatsProvider>,
    config: PoolConfig,
    seed: Option<u64>,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        items: Arc<dyn ItemSource>,
        answers: Arc<dyn AnswerSubmitter>,
        stats: Arc<dyn StatsProvider>,
    ) -> Self {
        Self {
            clock,
            items,
            answers,
            stats,
            config: PoolConfig::default(),
            seed: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Draw items reproducibly.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Start a new session for the given resource, loading its first page.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Pool` if the first page fails to load and
    /// `SessionError::Empty` if the resource has no items.
    pub async fn start_session(&self, resource_id: ResourceId) -> Result<PracticeSession, SessionError> {
        let pool = match self.seed {
            Some(seed) => {
                PracticeCardPool::with_seed(Arc::clone(&self.items), resource_id, self.config, seed)
            }
            None => PracticeCardPool::new(Arc::clone(&self.items), resource_id, self.config),
        };
        pool.load_more().await?;
        tracing::info!(
            resource_id = %pool.resource_id(),
            loaded = pool.loaded_len(),
            total = ?pool.total_count(),
            "practice session started"
        );
        PracticeSession::new(pool, self.clock.now())
    }

    /// The item to show next, drawing a fresh one when none is pending.
    ///
    /// Returns `None` once the session is complete. Running out of items completes
    /// the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Pool` when a page the session depends on fails to load.
    pub async fn next_item(&self, session: &mut PracticeSession) -> Result<Option<ReviewItem>, SessionError> {
        if session.is_complete() {
            return Ok(None);
        }
        if let Some(item) = session.current_item() {
            return Ok(Some(item.clone()));
        }

        let next = session.pool().next_unseen_or_wait(session.seen()).await?;
        match next {
            NextItem::Item(item) => {
                session.show(item.clone());
                Ok(Some(item))
            }
            NextItem::Exhausted | NextItem::AwaitingPage => {
                if session.mark_exhausted(self.clock.now()) == CompletionSignal::Completed {
                    self.fetch_stats_once(session).await;
                }
                Ok(None)
            }
        }
    }

    /// Submit an answer for the current item.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` for a finished session,
    /// `SessionError::NoCurrentItem` when nothing was drawn, and
    /// `SessionError::Api` if submission fails (the item stays current).
    pub async fn answer_current(
        &self,
        session: &mut PracticeSession,
        tier: DifficultyTier,
    ) -> Result<SessionAnswerResult, SessionError> {
        if session.is_complete() {
            return Err(SessionError::Completed);
        }
        let Some(item) = session.take_current() else {
            return Err(SessionError::NoCurrentItem);
        };

        let outcome = match self
            .answers
            .submit_answer(session.resource_id(), &item.id, tier)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(%err, item_id = %item.id, "answer submission failed");
                session.restore_current(item);
                return Err(err.into());
            }
        };

        let answered_at = self.clock.now();
        let item_id = item.id;
        let signal = session.record_answer(item_id.clone(), &outcome, answered_at);
        if signal == CompletionSignal::Completed {
            self.fetch_stats_once(session).await;
        }

        Ok(SessionAnswerResult {
            item_id,
            outcome,
            progress: session.progress(),
            is_complete: session.is_complete(),
            summary: session.summary(),
        })
    }

    /// Fetch the next page of the session's pool explicitly.
    ///
    /// This is how a caller retries after [`Self::next_item`] reported a failed
    /// page; draws never retry on their own.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Pool` if the page fails to load again.
    pub async fn reload(&self, session: &PracticeSession) -> Result<LoadOutcome, SessionError> {
        Ok(session.pool().load_more().await?)
    }

    /// Retry the statistics fetch after a completed session.
    ///
    /// This is useful when the fetch made at completion failed (e.g. transient
    /// network error).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotComplete` if the session is still running and
    /// `SessionError::Api` if the fetch fails again.
    pub async fn finalize_summary(&self, session: &mut PracticeSession) -> Result<SessionSummary, SessionError> {
        if let Some(summary) = session.summary() {
            return Ok(summary);
        }
        if !session.is_complete() {
            return Err(SessionError::NotComplete);
        }

        let stats = self.stats.session_stats(session.resource_id()).await?;
        session.set_stats(stats);
        session.summary().ok_or(SessionError::NotComplete)
    }

    /// Throw the session away and start over with a brand-new pool.
    ///
    /// Pages still in flight for the old pool are discarded when they land.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start_session`].
    pub async fn handle_restart(&self, session: PracticeSession) -> Result<PracticeSession, SessionError> {
        let resource_id = session.resource_id().clone();
        tracing::info!(%resource_id, answered = session.seen().len(), "restarting practice session");
        drop(session);
        self.start_session(resource_id).await
    }

    async fn fetch_stats_once(&self, session: &mut PracticeSession) {
        match self.stats.session_stats(session.resource_id()).await {
            Ok(stats) => session.set_stats(stats),
            Err(err) => {
                tracing::warn!(%err, resource_id = %session.resource_id(), "session stats unavailable");
            }
        }
    }
}
