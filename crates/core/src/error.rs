use thiserror::Error;

/// Reasons a progress event payload is rejected before it touches any state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EventError {
    #[error("event reports zero chunks")]
    NoChunks,
    #[error("chunk index {index} out of range for {total} chunks")]
    ChunkOutOfRange { index: u32, total: u32 },
    #[error("completed count {completed} exceeds {total} chunks")]
    CompletedOutOfRange { completed: u32, total: u32 },
    #[error("event for job {0} does not belong to this table")]
    ForeignJob(String),
}
