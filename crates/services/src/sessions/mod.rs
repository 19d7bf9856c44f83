mod completion;
mod pool;
mod progress;
mod service;
mod view;
mod workflow;

// Public API of the practice subsystem.
pub use crate::error::{PoolError, SessionError};
pub use completion::{CompletionSignal, ExpectedTotal, SessionCompletionDetector};
pub use pool::{LoadOutcome, NextItem, PoolConfig, PoolSnapshot, PracticeCardPool};
pub use progress::SessionProgress;
pub use service::PracticeSession;
pub use view::SessionSummary;
pub use workflow::{SessionAnswerResult, SessionLoopService};
