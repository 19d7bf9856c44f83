#![forbid(unsafe_code)]

pub mod error;
pub mod sessions;

pub use drill_core::Clock;
pub use sessions as session;

pub use error::{PoolError, SessionError};

pub use sessions::{
    CompletionSignal, ExpectedTotal, LoadOutcome, NextItem, PoolConfig, PoolSnapshot,
    PracticeCardPool, PracticeSession, SessionAnswerResult, SessionCompletionDetector,
    SessionLoopService, SessionProgress, SessionSummary,
};
