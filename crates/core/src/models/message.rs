//! 协调器与Worker之间传输的请求/响应体

use serde::{Deserialize, Serialize};

use super::{Assignment, ChunkId, JobId};

/// `AssignChunk` 请求，由Dispatcher发给Worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignChunkRequest {
    pub job_id: JobId,
    pub chunk_id: ChunkId,
    pub attempt: u32,
    pub file_path: String,
    pub start_offset: u64,
    pub length: u64,
}

impl AssignChunkRequest {
    pub fn assignment(&self) -> Assignment {
        Assignment {
            job_id: self.job_id,
            chunk_id: self.chunk_id,
            attempt: self.attempt,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

/// 空确认
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
