use std::collections::HashSet;

use drill_core::model::ItemId;

/// How many items a session has to get through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedTotal {
    /// The backend reported the size of the resource up front.
    Known(u32),
    /// No count was reported; follow whatever the pool has loaded.
    Discovered,
}

impl ExpectedTotal {
    #[must_use]
    pub fn from_total_count(total_count: Option<u32>) -> Self {
        total_count.map_or(Self::Discovered, Self::Known)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    Continue,
    /// Emitted once, on the transition into completed.
    Completed,
    AlreadyCompleted,
}

/// Tracks the items seen in one session and decides when it is done.
#[derive(Debug, Clone)]
pub struct SessionCompletionDetector {
    expected: ExpectedTotal,
    seen: HashSet<ItemId>,
    completed: bool,
}

impl SessionCompletionDetector {
    #[must_use]
    pub fn new(expected: ExpectedTotal) -> Self {
        Self {
            expected,
            seen: HashSet::new(),
            completed: false,
        }
    }

    #[must_use]
    pub fn expected(&self) -> ExpectedTotal {
        self.expected
    }

    #[must_use]
    pub fn seen(&self) -> &HashSet<ItemId> {
        &self.seen
    }

    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Record `item_id` as seen and re-evaluate.
    ///
    /// `loaded` and `has_more_pages` describe the pool right now; they only matter
    /// when the total is being discovered.
    pub fn record(&mut self, item_id: ItemId, loaded: usize, has_more_pages: bool) -> CompletionSignal {
        if self.completed {
            return CompletionSignal::AlreadyCompleted;
        }
        self.seen.insert(item_id);

        let done = match self.expected {
            ExpectedTotal::Known(total) => {
                self.seen.len() >= usize::try_from(total).unwrap_or(usize::MAX)
            }
            ExpectedTotal::Discovered => !has_more_pages && self.seen.len() >= loaded,
        };
        self.finish_if(done)
    }

    /// The pool ran dry before the expected total was reached.
    pub fn mark_exhausted(&mut self) -> CompletionSignal {
        if self.completed {
            return CompletionSignal::AlreadyCompleted;
        }
        self.finish_if(true)
    }

    fn finish_if(&mut self, done: bool) -> CompletionSignal {
        if done {
            self.completed = true;
            tracing::debug!(seen = self.seen.len(), "practice session complete");
            CompletionSignal::Completed
        } else {
            CompletionSignal::Continue
        }
    }
}
