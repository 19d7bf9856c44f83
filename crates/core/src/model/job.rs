use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::model::ids::{ChunkId, JobId};

/// Status a chunk reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Final status of a whole job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Progress report for a single chunk of a job.
///
/// Events arrive in send order within one connection, but chunk indices are not
/// ordered: a later chunk may finish before an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgressEvent {
    pub job_id: JobId,
    pub chunk_id: ChunkId,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub status: ChunkStatus,
    pub completed_chunk_count: u32,
    #[serde(default)]
    pub items_produced_in_chunk: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ChunkProgressEvent {
    /// Checks the structural invariants of the payload.
    ///
    /// # Errors
    ///
    /// Returns `EventError` when indices or counts are inconsistent with `total_chunks`.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.total_chunks == 0 {
            return Err(EventError::NoChunks);
        }
        if self.chunk_index >= self.total_chunks {
            return Err(EventError::ChunkOutOfRange {
                index: self.chunk_index,
                total: self.total_chunks,
            });
        }
        if self.completed_chunk_count > self.total_chunks {
            return Err(EventError::CompletedOutOfRange {
                completed: self.completed_chunk_count,
                total: self.total_chunks,
            });
        }
        Ok(())
    }
}

/// Terminal report for a job. No chunk events are expected after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletionEvent {
    pub job_id: JobId,
    pub final_status: JobStatus,
    pub total_chunks: u32,
    #[serde(default)]
    pub total_items_produced: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(index: u32, total: u32, completed: u32) -> ChunkProgressEvent {
        ChunkProgressEvent {
            job_id: JobId::new("J1"),
            chunk_id: ChunkId::new(format!("c{index}")),
            chunk_index: index,
            total_chunks: total,
            status: ChunkStatus::Processing,
            completed_chunk_count: completed,
            items_produced_in_chunk: 0,
            error_message: None,
        }
    }

    #[test]
    fn validate_accepts_consistent_event() {
        assert_eq!(event(3, 4, 3).validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_out_of_range_index() {
        assert_eq!(
            event(4, 4, 0).validate(),
            Err(EventError::ChunkOutOfRange { index: 4, total: 4 })
        );
        assert_eq!(event(0, 0, 0).validate(), Err(EventError::NoChunks));
        assert!(event(0, 2, 3).validate().is_err());
    }

    #[test]
    fn decodes_wire_payload() {
        let json = r#"{
            "jobId": "J1", "chunkId": "c2", "chunkIndex": 2, "totalChunks": 5,
            "status": "completed", "completedChunkCount": 1, "itemsProducedInChunk": 12
        }"#;
        let ev: ChunkProgressEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.status, ChunkStatus::Completed);
        assert_eq!(ev.items_produced_in_chunk, 12);
        assert!(ev.error_message.is_none());
    }
}
