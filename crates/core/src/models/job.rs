use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChunkId, MetricsSnapshot};

pub type JobId = Uuid;

/// 作业状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobState {
    #[serde(rename = "PLANNING")]
    Planning,
    #[serde(rename = "DISPATCHING")]
    Dispatching,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "PARTIALLY_FAILED")]
    PartiallyFailed,
    #[serde(rename = "ABORTED")]
    Aborted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::PartiallyFailed | JobState::Aborted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Planning => "PLANNING",
            JobState::Dispatching => "DISPATCHING",
            JobState::Completed => "COMPLETED",
            JobState::PartiallyFailed => "PARTIALLY_FAILED",
            JobState::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `GetJobStatus` 的返回值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub job_id: JobId,
    pub file_path: String,
    pub file_size: u64,
    pub state: JobState,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub in_flight_chunks: usize,
    pub failed_chunks: Vec<ChunkId>,
    pub metrics: MetricsSnapshot,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 规划阶段失败等原因
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}
