use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use drill_core::model::JobId;

use crate::connection::{ConnectionManager, LinkHandle};
use crate::protocol::ClientCommand;

#[derive(Default)]
struct SubscriptionState {
    /// Jobs some consumer wants events for.
    desired: BTreeSet<JobId>,
    /// Jobs already registered on the link identified by `active_epoch`.
    active: HashSet<JobId>,
    active_epoch: u64,
}

impl SubscriptionState {
    /// Forget registrations made on an older link; the server dropped them with it.
    fn align(&mut self, link: &LinkHandle) {
        if self.active_epoch != link.epoch() {
            self.active_epoch = link.epoch();
            self.active.clear();
        }
    }
}

/// Shares the one connection between every consumer interested in job events.
///
/// Desired subscriptions survive disconnects and are re-issued on every
/// transition into `Connected`; each job is registered at most once per link.
pub struct SubscriptionMultiplexer {
    connection: ConnectionManager,
    state: Mutex<SubscriptionState>,
}

impl SubscriptionMultiplexer {
    /// Creates a multiplexer and hooks its replay into `connection`.
    #[must_use]
    pub fn attach(connection: &ConnectionManager) -> Arc<Self> {
        let multiplexer = Arc::new(Self {
            connection: connection.clone(),
            state: Mutex::new(SubscriptionState::default()),
        });
        let weak = Arc::downgrade(&multiplexer);
        connection.on_connected(move |link| {
            if let Some(multiplexer) = weak.upgrade() {
                multiplexer.replay(link);
            }
        });
        multiplexer
    }

    fn lock(&self) -> MutexGuard<'_, SubscriptionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `job_id` to the desired set, registering it right away when connected.
    pub fn subscribe(&self, job_id: JobId) {
        let mut state = self.lock();
        state.desired.insert(job_id.clone());

        let Some(link) = self.connection.current_link() else {
            tracing::debug!(%job_id, "subscription deferred until connected");
            return;
        };
        state.align(&link);
        if state.active.insert(job_id.clone()) {
            link.send(ClientCommand::Subscribe { job_id });
        }
    }

    /// Removes `job_id` from the desired set. Unknown ids are ignored.
    pub fn unsubscribe(&self, job_id: &JobId) {
        let mut state = self.lock();
        if !state.desired.remove(job_id) {
            return;
        }

        let Some(link) = self.connection.current_link() else {
            return;
        };
        state.align(&link);
        if state.active.remove(job_id) {
            link.send(ClientCommand::Unsubscribe {
                job_id: job_id.clone(),
            });
        }
    }

    #[must_use]
    pub fn is_subscribed(&self, job_id: &JobId) -> bool {
        self.lock().desired.contains(job_id)
    }

    /// Desired job ids in sorted order.
    #[must_use]
    pub fn desired(&self) -> Vec<JobId> {
        self.lock().desired.iter().cloned().collect()
    }

    fn replay(&self, link: &LinkHandle) {
        let mut state = self.lock();
        state.align(link);
        let pending: Vec<JobId> = state
            .desired
            .iter()
            .filter(|job_id| !state.active.contains(*job_id))
            .cloned()
            .collect();
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), epoch = link.epoch(), "replaying subscriptions");
        }
        for job_id in pending {
            state.active.insert(job_id.clone());
            link.send(ClientCommand::Subscribe { job_id });
        }
    }
}
