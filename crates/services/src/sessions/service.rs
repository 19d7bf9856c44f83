use chrono::{DateTime, Utc};
use std::fmt;

use drill_core::model::{AnswerOutcome, ItemId, ResourceId, ReviewItem, SessionStats};

use super::completion::{CompletionSignal, ExpectedTotal, SessionCompletionDetector};
use super::pool::PracticeCardPool;
use super::progress::SessionProgress;
use super::view::SessionSummary;
use crate::error::SessionError;

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One pass over a resource's items.
///
/// Owns its pool: a restart builds a new session (and pool) rather than
/// resetting this one.
pub struct PracticeSession {
    resource_id: ResourceId,
    pool: PracticeCardPool,
    detector: SessionCompletionDetector,
    current: Option<ReviewItem>,
    xp_earned: u64,
    level_ups: u32,
    level: Option<u32>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    stats: Option<SessionStats>,
}

impl PracticeSession {
    /// Create a session over an initialized pool.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if the pool has nothing to practice.
    pub fn new(pool: PracticeCardPool, started_at: DateTime<Utc>) -> Result<Self, SessionError> {
        if pool.loaded_len() == 0 && !pool.has_more_pages() {
            return Err(SessionError::Empty);
        }
        let expected = ExpectedTotal::from_total_count(pool.total_count());
        Ok(Self {
            resource_id: pool.resource_id().clone(),
            pool,
            detector: SessionCompletionDetector::new(expected),
            current: None,
            xp_earned: 0,
            level_ups: 0,
            level: None,
            started_at,
            completed_at: None,
            stats: None,
        })
    }

    #[must_use]
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    #[must_use]
    pub fn pool(&self) -> &PracticeCardPool {
        &self.pool
    }

    #[must_use]
    pub fn current_item(&self) -> Option<&ReviewItem> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.detector.is_complete()
    }

    /// Ids answered so far in this session.
    #[must_use]
    pub fn seen(&self) -> &std::collections::HashSet<ItemId> {
        self.detector.seen()
    }

    #[must_use]
    pub fn xp_earned(&self) -> u64 {
        self.xp_earned
    }

    #[must_use]
    pub fn stats(&self) -> Option<&SessionStats> {
        self.stats.as_ref()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            answered: self.detector.seen_count(),
            expected: match self.detector.expected() {
                ExpectedTotal::Known(total) => Some(total),
                ExpectedTotal::Discovered => None,
            },
            loaded: self.pool.loaded_len(),
            is_complete: self.detector.is_complete(),
        }
    }

    pub(crate) fn show(&mut self, item: ReviewItem) {
        self.current = Some(item);
    }

    pub(crate) fn take_current(&mut self) -> Option<ReviewItem> {
        self.current.take()
    }

    /// Put back an item whose answer could not be submitted.
    pub(crate) fn restore_current(&mut self, item: ReviewItem) {
        self.current = Some(item);
    }

    /// Apply a submitted answer and re-evaluate completion.
    pub(crate) fn record_answer(
        &mut self,
        item_id: ItemId,
        outcome: &AnswerOutcome,
        answered_at: DateTime<Utc>,
    ) -> CompletionSignal {
        self.xp_earned += u64::from(outcome.xp_gained);
        if outcome.leveled_up {
            self.level_ups += 1;
        }
        if outcome.new_level.is_some() {
            self.level = outcome.new_level;
        }

        let signal = self.detector.record(
            item_id,
            self.pool.loaded_len(),
            self.pool.has_more_pages(),
        );
        self.note_completion(signal, answered_at);
        signal
    }

    pub(crate) fn mark_exhausted(&mut self, at: DateTime<Utc>) -> CompletionSignal {
        let signal = self.detector.mark_exhausted();
        self.note_completion(signal, at);
        signal
    }

    fn note_completion(&mut self, signal: CompletionSignal, at: DateTime<Utc>) {
        if signal == CompletionSignal::Completed {
            self.current = None;
            self.completed_at = Some(at);
        }
    }

    pub(crate) fn set_stats(&mut self, stats: SessionStats) {
        self.stats = Some(stats);
    }

    /// Summary of a completed session whose statistics were fetched.
    #[must_use]
    pub fn summary(&self) -> Option<SessionSummary> {
        let completed_at = self.completed_at?;
        let stats = self.stats.clone()?;
        Some(SessionSummary {
            resource_id: self.resource_id.clone(),
            started_at: self.started_at,
            completed_at,
            items_answered: u32::try_from(self.detector.seen_count()).unwrap_or(u32::MAX),
            xp_earned: self.xp_earned,
            level_ups: self.level_ups,
            level: self.level,
            stats,
        })
    }
}

impl fmt::Debug for PracticeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PracticeSession")
            .field("resource_id", &self.resource_id)
            .field("answered", &self.detector.seen_count())
            .field("current", &self.current.as_ref().map(|item| &item.id))
            .field("completed_at", &self.completed_at)
            .finish_non_exhaustive()
    }
}
