//! Per-job chunk bookkeeping driven by progress events.
//!
//! The table is index-addressable: events may complete chunks in any order, and
//! each event only ever touches its own slot (plus the display-only promotion of
//! the following slot).

use crate::error::EventError;
use crate::model::{ChunkProgressEvent, ChunkStatus, JobCompletionEvent, JobId, JobStatus};

//
// ─── CHUNK STATE ───────────────────────────────────────────────────────────────
//

/// Client-side view of a chunk's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkPhase {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ChunkPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl From<ChunkStatus> for ChunkPhase {
    fn from(status: ChunkStatus) -> Self {
        match status {
            ChunkStatus::Processing => Self::Processing,
            ChunkStatus::Completed => Self::Completed,
            ChunkStatus::Failed => Self::Failed,
        }
    }
}

/// One slot of the table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkState {
    pub phase: ChunkPhase,
    pub items_produced: u32,
    pub error_message: Option<String>,
    /// Set when `phase` was guessed by the client rather than reported by the backend.
    ///
    /// Only `Processing` is ever inferred; any backend report clears the flag.
    pub inferred: bool,
}

impl ChunkState {
    fn infer_processing(&mut self) {
        if self.phase == ChunkPhase::Pending {
            self.phase = ChunkPhase::Processing;
            self.inferred = true;
        }
    }
}

/// Aggregate handed to progress listeners after every applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub completed_chunk_count: u32,
    pub total_chunks: u32,
    pub running_item_total: u64,
}

/// Result of feeding one event into the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(ProgressSnapshot),
    /// Superseded or duplicate delivery; counted and otherwise ignored.
    Stale,
    /// The job already reported completion.
    Terminal,
}

//
// ─── TABLE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone)]
pub struct ChunkStateTable {
    job_id: JobId,
    chunks: Vec<ChunkState>,
    completed_high_water: u32,
    stale_events: u64,
    final_status: Option<JobStatus>,
}

impl ChunkStateTable {
    /// Creates a table for `job_id`; chunk 0 starts out as (inferred) `Processing`.
    ///
    /// `total_chunks` may be 0 when the size is not known yet; the table grows on
    /// the first event.
    #[must_use]
    pub fn new(job_id: JobId, total_chunks: u32) -> Self {
        let mut table = Self {
            job_id,
            chunks: Vec::new(),
            completed_high_water: 0,
            stale_events: 0,
            final_status: None,
        };
        table.ensure_len(total_chunks);
        table
    }

    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    #[must_use]
    pub fn chunks(&self) -> &[ChunkState] {
        &self.chunks
    }

    #[must_use]
    pub fn chunk(&self, index: usize) -> Option<&ChunkState> {
        self.chunks.get(index)
    }

    #[must_use]
    pub fn total_chunks(&self) -> u32 {
        u32::try_from(self.chunks.len()).unwrap_or(u32::MAX)
    }

    /// Highest completed-chunk count accepted so far.
    #[must_use]
    pub fn completed_chunk_count(&self) -> u32 {
        self.completed_high_water
    }

    /// Items produced across all chunks, recomputed from the slots so that a
    /// re-delivered event never counts twice.
    #[must_use]
    pub fn running_item_total(&self) -> u64 {
        self.chunks.iter().map(|c| u64::from(c.items_produced)).sum()
    }

    #[must_use]
    pub fn stale_events(&self) -> u64 {
        self.stale_events
    }

    #[must_use]
    pub fn final_status(&self) -> Option<JobStatus> {
        self.final_status
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.final_status.is_some()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            job_id: self.job_id.clone(),
            completed_chunk_count: self.completed_high_water,
            total_chunks: self.total_chunks(),
            running_item_total: self.running_item_total(),
        }
    }

    fn ensure_len(&mut self, total_chunks: u32) {
        let total = usize::try_from(total_chunks).unwrap_or(usize::MAX);
        if total <= self.chunks.len() {
            return;
        }
        let was_empty = self.chunks.is_empty();
        self.chunks.resize_with(total, ChunkState::default);
        if was_empty && self.final_status.is_none() {
            self.chunks[0].infer_processing();
        }
    }

    /// Applies a chunk event.
    ///
    /// # Errors
    ///
    /// Returns `EventError` when the event belongs to another job or is
    /// structurally invalid. The table is left untouched in that case.
    pub fn apply(&mut self, event: &ChunkProgressEvent) -> Result<ApplyOutcome, EventError> {
        if event.job_id != self.job_id {
            return Err(EventError::ForeignJob(event.job_id.to_string()));
        }
        event.validate()?;

        if self.is_terminal() {
            return Ok(ApplyOutcome::Terminal);
        }
        if event.completed_chunk_count < self.completed_high_water {
            self.stale_events += 1;
            return Ok(ApplyOutcome::Stale);
        }

        self.ensure_len(event.total_chunks);
        let index = usize::try_from(event.chunk_index).unwrap_or(usize::MAX);
        let Some(slot) = self.chunks.get_mut(index) else {
            return Err(EventError::ChunkOutOfRange {
                index: event.chunk_index,
                total: event.total_chunks,
            });
        };

        // A chunk that already finished cannot go back to Processing.
        if slot.phase.is_terminal() && !event.status.is_terminal() {
            self.stale_events += 1;
            return Ok(ApplyOutcome::Stale);
        }

        *slot = ChunkState {
            phase: event.status.into(),
            items_produced: event.items_produced_in_chunk,
            error_message: event.error_message.clone(),
            inferred: false,
        };

        if event.status == ChunkStatus::Completed {
            if let Some(next) = self.chunks.get_mut(index + 1) {
                next.infer_processing();
            }
        }

        self.completed_high_water = self.completed_high_water.max(event.completed_chunk_count);
        Ok(ApplyOutcome::Applied(self.snapshot()))
    }

    /// Marks the job terminal. Returns `true` only for the first completion.
    ///
    /// # Errors
    ///
    /// Returns `EventError::ForeignJob` for events of another job.
    pub fn complete(&mut self, event: &JobCompletionEvent) -> Result<bool, EventError> {
        if event.job_id != self.job_id {
            return Err(EventError::ForeignJob(event.job_id.to_string()));
        }
        if self.is_terminal() {
            return Ok(false);
        }
        self.ensure_len(event.total_chunks);
        self.final_status = Some(event.final_status);
        Ok(true)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkId;

    fn event(index: u32, status: ChunkStatus, completed: u32, items: u32) -> ChunkProgressEvent {
        ChunkProgressEvent {
            job_id: JobId::new("J1"),
            chunk_id: ChunkId::new(format!("c{index}")),
            chunk_index: index,
            total_chunks: 5,
            status,
            completed_chunk_count: completed,
            items_produced_in_chunk: items,
            error_message: None,
        }
    }

    fn completion(status: JobStatus) -> JobCompletionEvent {
        JobCompletionEvent {
            job_id: JobId::new("J1"),
            final_status: status,
            total_chunks: 5,
            total_items_produced: 0,
            error_message: None,
        }
    }

    #[test]
    fn chunk_zero_starts_processing() {
        let table = ChunkStateTable::new(JobId::new("J1"), 3);
        assert_eq!(table.chunk(0).unwrap().phase, ChunkPhase::Processing);
        assert!(table.chunk(0).unwrap().inferred);
        assert_eq!(table.chunk(1).unwrap().phase, ChunkPhase::Pending);
    }

    #[test]
    fn unsized_table_grows_on_first_event() {
        let mut table = ChunkStateTable::new(JobId::new("J1"), 0);
        assert!(table.chunks().is_empty());

        table
            .apply(&event(1, ChunkStatus::Processing, 0, 0))
            .unwrap();
        assert_eq!(table.total_chunks(), 5);
        assert_eq!(table.chunk(0).unwrap().phase, ChunkPhase::Processing);
        assert_eq!(table.chunk(1).unwrap().phase, ChunkPhase::Processing);
    }

    #[test]
    fn out_of_order_completion_only_touches_its_neighbour() {
        let mut table = ChunkStateTable::new(JobId::new("J1"), 5);
        table
            .apply(&event(1, ChunkStatus::Processing, 0, 0))
            .unwrap();

        let outcome = table
            .apply(&event(2, ChunkStatus::Completed, 1, 7))
            .unwrap();

        assert!(matches!(outcome, ApplyOutcome::Applied(_)));
        assert_eq!(table.chunk(2).unwrap().phase, ChunkPhase::Completed);
        assert_eq!(table.chunk(3).unwrap().phase, ChunkPhase::Processing);
        assert!(table.chunk(3).unwrap().inferred);
        assert_eq!(table.chunk(1).unwrap().phase, ChunkPhase::Processing);
        assert!(!table.chunk(1).unwrap().inferred);
        assert_eq!(table.chunk(4).unwrap().phase, ChunkPhase::Pending);
    }

    #[test]
    fn regression_in_completed_count_is_stale() {
        let mut table = ChunkStateTable::new(JobId::new("J1"), 5);
        table.apply(&event(0, ChunkStatus::Completed, 1, 3)).unwrap();
        table.apply(&event(1, ChunkStatus::Completed, 2, 4)).unwrap();

        let outcome = table.apply(&event(3, ChunkStatus::Completed, 1, 9)).unwrap();

        assert_eq!(outcome, ApplyOutcome::Stale);
        assert_eq!(table.stale_events(), 1);
        assert_eq!(table.completed_chunk_count(), 2);
        assert_eq!(table.chunk(3).unwrap().phase, ChunkPhase::Pending);
        assert_eq!(table.running_item_total(), 7);
    }

    #[test]
    fn redelivered_completion_does_not_double_count_items() {
        let mut table = ChunkStateTable::new(JobId::new("J1"), 5);
        table.apply(&event(0, ChunkStatus::Completed, 1, 10)).unwrap();
        table.apply(&event(0, ChunkStatus::Completed, 1, 10)).unwrap();
        assert_eq!(table.running_item_total(), 10);
    }

    #[test]
    fn terminal_chunk_does_not_regress_to_processing() {
        let mut table = ChunkStateTable::new(JobId::new("J1"), 5);
        table.apply(&event(0, ChunkStatus::Completed, 1, 2)).unwrap();
        let outcome = table.apply(&event(0, ChunkStatus::Processing, 1, 0)).unwrap();
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert_eq!(table.chunk(0).unwrap().phase, ChunkPhase::Completed);
    }

    #[test]
    fn failure_overrides_inferred_processing() {
        let mut table = ChunkStateTable::new(JobId::new("J1"), 5);
        table.apply(&event(0, ChunkStatus::Completed, 1, 2)).unwrap();
        assert!(table.chunk(1).unwrap().inferred);

        let mut failed = event(1, ChunkStatus::Failed, 1, 0);
        failed.error_message = Some("boom".into());
        table.apply(&failed).unwrap();

        let chunk = table.chunk(1).unwrap();
        assert_eq!(chunk.phase, ChunkPhase::Failed);
        assert!(!chunk.inferred);
        assert_eq!(chunk.error_message.as_deref(), Some("boom"));
        assert_eq!(table.chunk(2).unwrap().phase, ChunkPhase::Pending);
    }

    #[test]
    fn events_after_completion_are_ignored() {
        let mut table = ChunkStateTable::new(JobId::new("J1"), 5);
        assert!(table.complete(&completion(JobStatus::Completed)).unwrap());
        assert!(!table.complete(&completion(JobStatus::Failed)).unwrap());
        assert_eq!(table.final_status(), Some(JobStatus::Completed));

        let outcome = table.apply(&event(4, ChunkStatus::Completed, 5, 3)).unwrap();
        assert_eq!(outcome, ApplyOutcome::Terminal);
        assert_eq!(table.running_item_total(), 0);
    }

    #[test]
    fn foreign_and_invalid_events_are_rejected() {
        let mut table = ChunkStateTable::new(JobId::new("J1"), 5);
        let mut foreign = event(0, ChunkStatus::Completed, 1, 1);
        foreign.job_id = JobId::new("J2");
        assert!(matches!(table.apply(&foreign), Err(EventError::ForeignJob(_))));

        let mut invalid = event(0, ChunkStatus::Completed, 1, 1);
        invalid.chunk_index = 9;
        assert!(table.apply(&invalid).is_err());
        assert_eq!(table.chunk(0).unwrap().phase, ChunkPhase::Processing);
    }
}
