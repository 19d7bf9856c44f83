//! JSON frames exchanged with the job-progress endpoint.

use serde::{Deserialize, Serialize};

use drill_core::model::{ChunkProgressEvent, JobCompletionEvent, JobId};

use crate::error::DecodeError;

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    Subscribe {
        #[serde(rename = "jobId")]
        job_id: JobId,
    },
    Unsubscribe {
        #[serde(rename = "jobId")]
        job_id: JobId,
    },
}

impl ClientCommand {
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Subscribe { job_id } | Self::Unsubscribe { job_id } => job_id,
        }
    }
}

/// Server → client frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    ChunkProgress(ChunkProgressEvent),
    JobCompleted(JobCompletionEvent),
}

impl ServerEvent {
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::ChunkProgress(event) => &event.job_id,
            Self::JobCompleted(event) => &event.job_id,
        }
    }

    /// Serialize for the wire. Only fails on non-string map keys, which these types lack.
    #[must_use]
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Decode and structurally validate one inbound text frame.
///
/// # Errors
///
/// Returns `DecodeError` for invalid JSON, unknown frame types, or chunk events
/// whose indices do not fit their chunk count.
pub fn decode_event(frame: &str) -> Result<ServerEvent, DecodeError> {
    let event: ServerEvent = serde_json::from_str(frame)?;
    if let ServerEvent::ChunkProgress(chunk) = &event {
        chunk.validate()?;
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::model::ChunkStatus;

    #[test]
    fn subscribe_frame_shape() {
        let frame = serde_json::to_string(&ClientCommand::Subscribe {
            job_id: JobId::new("J1"),
        })
        .unwrap();
        assert_eq!(frame, r#"{"type":"subscribe","jobId":"J1"}"#);
    }

    #[test]
    fn decodes_chunk_progress() {
        let frame = r#"{"type":"chunkProgress","jobId":"J1","chunkId":"c0","chunkIndex":0,
            "totalChunks":3,"status":"processing","completedChunkCount":0}"#;
        let ServerEvent::ChunkProgress(event) = decode_event(frame).unwrap() else {
            panic!("expected chunk progress");
        };
        assert_eq!(event.status, ChunkStatus::Processing);
        assert_eq!(event.items_produced_in_chunk, 0);
    }

    #[test]
    fn decodes_job_completion() {
        let frame = r#"{"type":"jobCompleted","jobId":"J1","finalStatus":"failed",
            "totalChunks":3,"totalItemsProduced":4,"errorMessage":"quota"}"#;
        let event = decode_event(frame).unwrap();
        assert_eq!(event.job_id(), &JobId::new("J1"));
    }

    #[test]
    fn rejects_garbage_and_unknown_types() {
        assert!(matches!(decode_event("not json"), Err(DecodeError::Json(_))));
        assert!(decode_event(r#"{"type":"heartbeat"}"#).is_err());
    }

    #[test]
    fn rejects_out_of_range_chunk() {
        let frame = r#"{"type":"chunkProgress","jobId":"J1","chunkId":"c9","chunkIndex":9,
            "totalChunks":3,"status":"completed","completedChunkCount":1}"#;
        assert!(matches!(decode_event(frame), Err(DecodeError::Invalid(_))));
    }
}
