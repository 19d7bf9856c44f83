//! Turns inbound frames into chunk-table updates and listener callbacks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use drill_core::model::{ChunkProgressEvent, JobCompletionEvent, JobId};
use drill_core::progress::{ApplyOutcome, ChunkStateTable, ProgressSnapshot};

use crate::connection::ConnectionManager;
use crate::protocol::{ServerEvent, decode_event};

/// Handle returned by listener registration, used to remove the listener again.
pub type ListenerId = u64;

type ProgressListener = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;
type CompletionListener = Arc<dyn Fn(&JobCompletionEvent) + Send + Sync>;

#[derive(Default)]
struct RouterState {
    /// Table of the one job listeners currently care about.
    focus: Option<ChunkStateTable>,
    /// Bumped whenever the focus changes, so delayed completions can tell.
    focus_epoch: u64,
    next_listener: ListenerId,
    progress: Vec<(ListenerId, ProgressListener)>,
    completion: Vec<(ListenerId, CompletionListener)>,
    dropped: u64,
}

pub struct ProgressEventRouter {
    state: Mutex<RouterState>,
    completion_delay: Duration,
}

impl ProgressEventRouter {
    /// `completion_delay` is the minimum time between a job's completion event and
    /// the completion callbacks, so fast jobs do not flash past.
    #[must_use]
    pub fn new(completion_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RouterState::default()),
            completion_delay,
        })
    }

    /// Feed every frame received by `connection` into this router.
    pub fn attach(self: &Arc<Self>, connection: &ConnectionManager) {
        let weak = Arc::downgrade(self);
        connection.on_frame(move |frame| {
            if let Some(router) = weak.upgrade() {
                router.handle_frame(frame);
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    //
    // ─── FOCUS ─────────────────────────────────────────────────────────────────
    //

    /// Start routing events of `job_id` into a fresh table. `total_chunks` may be 0
    /// when unknown.
    pub fn track(&self, job_id: JobId, total_chunks: u32) {
        let mut state = self.lock();
        state.focus = Some(ChunkStateTable::new(job_id, total_chunks));
        state.focus_epoch += 1;
    }

    /// Stop routing `job_id`, if it is the tracked job.
    pub fn untrack(&self, job_id: &JobId) {
        let mut state = self.lock();
        if state.focus.as_ref().is_some_and(|t| t.job_id() == job_id) {
            state.focus = None;
            state.focus_epoch += 1;
        }
    }

    #[must_use]
    pub fn tracked_job(&self) -> Option<JobId> {
        self.lock().focus.as_ref().map(|t| t.job_id().clone())
    }

    /// Copy of the tracked job's chunk table.
    #[must_use]
    pub fn table(&self) -> Option<ChunkStateTable> {
        self.lock().focus.clone()
    }

    /// Stale or duplicate events ignored for the tracked job.
    #[must_use]
    pub fn stale_event_count(&self) -> u64 {
        self.lock().focus.as_ref().map_or(0, ChunkStateTable::stale_events)
    }

    /// Frames dropped because they could not be decoded or validated.
    #[must_use]
    pub fn dropped_event_count(&self) -> u64 {
        self.lock().dropped
    }

    //
    // ─── LISTENERS ─────────────────────────────────────────────────────────────
    //

    pub fn on_chunk_progress(
        &self,
        listener: impl Fn(&ProgressSnapshot) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut state = self.lock();
        state.next_listener += 1;
        let id = state.next_listener;
        state.progress.push((id, Arc::new(listener)));
        id
    }

    pub fn on_job_completed(
        &self,
        listener: impl Fn(&JobCompletionEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut state = self.lock();
        state.next_listener += 1;
        let id = state.next_listener;
        state.completion.push((id, Arc::new(listener)));
        id
    }

    /// Returns true if a listener with `id` was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.lock();
        let before = state.progress.len() + state.completion.len();
        state.progress.retain(|(listener, _)| *listener != id);
        state.completion.retain(|(listener, _)| *listener != id);
        before != state.progress.len() + state.completion.len()
    }

    //
    // ─── DISPATCH ──────────────────────────────────────────────────────────────
    //

    /// Decode and route one raw frame. Bad frames are logged and dropped.
    pub fn handle_frame(self: &Arc<Self>, frame: &str) {
        match decode_event(frame) {
            Ok(event) => self.handle_event(event),
            Err(err) => {
                tracing::warn!(%err, "dropping progress frame");
                self.lock().dropped += 1;
            }
        }
    }

    pub fn handle_event(self: &Arc<Self>, event: ServerEvent) {
        match event {
            ServerEvent::ChunkProgress(event) => self.handle_chunk(&event),
            ServerEvent::JobCompleted(event) => self.handle_completion(event),
        }
    }

    fn handle_chunk(&self, event: &ChunkProgressEvent) {
        let (snapshot, listeners) = {
            let mut guard = self.lock();
            let RouterState {
                focus,
                progress,
                dropped,
                ..
            } = &mut *guard;

            let Some(table) = focus.as_mut().filter(|t| t.job_id() == &event.job_id) else {
                tracing::trace!(job_id = %event.job_id, "event for untracked job");
                return;
            };
            match table.apply(event) {
                Ok(ApplyOutcome::Applied(snapshot)) => {
                    let listeners: Vec<ProgressListener> =
                        progress.iter().map(|(_, l)| Arc::clone(l)).collect();
                    (snapshot, listeners)
                }
                Ok(ApplyOutcome::Stale) => {
                    tracing::debug!(
                        job_id = %event.job_id,
                        chunk = event.chunk_index,
                        completed = event.completed_chunk_count,
                        "ignoring stale chunk event"
                    );
                    return;
                }
                Ok(ApplyOutcome::Terminal) => return,
                Err(err) => {
                    tracing::warn!(%err, "dropping chunk event");
                    *dropped += 1;
                    return;
                }
            }
        };

        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn handle_completion(self: &Arc<Self>, event: JobCompletionEvent) {
        let focus_epoch = {
            let mut guard = self.lock();
            let focus_epoch = guard.focus_epoch;
            let Some(table) = guard
                .focus
                .as_mut()
                .filter(|t| t.job_id() == &event.job_id)
            else {
                return;
            };
            match table.complete(&event) {
                Ok(true) => focus_epoch,
                Ok(false) | Err(_) => return,
            }
        };

        tracing::info!(job_id = %event.job_id, status = ?event.final_status, "job finished");
        let router = Arc::clone(self);
        let delay = self.completion_delay;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    router.fire_completion(&event, focus_epoch);
                });
            }
            Err(_) => router.fire_completion(&event, focus_epoch),
        }
    }

    fn fire_completion(&self, event: &JobCompletionEvent, focus_epoch: u64) {
        let listeners: Vec<CompletionListener> = {
            let state = self.lock();
            if state.focus_epoch != focus_epoch {
                tracing::debug!(job_id = %event.job_id, "focus moved before completion fired");
                return;
            }
            state.completion.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(event);
        }
    }
}
