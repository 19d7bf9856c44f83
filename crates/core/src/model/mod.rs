mod ids;
mod item;
mod job;
mod practice;

pub use ids::{ChunkId, ItemId, JobId, ResourceId};

pub use item::{ItemPage, ReviewItem};
pub use job::{ChunkProgressEvent, ChunkStatus, JobCompletionEvent, JobStatus};
pub use practice::{AnswerOutcome, DifficultyTier, SessionStats};
