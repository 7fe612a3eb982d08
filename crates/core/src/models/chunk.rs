use serde::{Deserialize, Serialize};

/// 分块序号，同时代表其在文件中的顺序
pub type ChunkId = u64;

/// 分块状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChunkState {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ASSIGNED")]
    Assigned,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ChunkState {
    /// 已进入终止状态（不会再被调度）
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkState::Completed | ChunkState::Failed)
    }

    /// 已分配给某个Worker且尚未结束
    pub fn is_active(&self) -> bool {
        matches!(self, ChunkState::Assigned | ChunkState::InProgress)
    }
}

/// 文件中一段按行对齐的字节区间
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub start_offset: u64,
    pub length: u64,
    pub state: ChunkState,
    pub assigned_worker: Option<String>,
    /// 已发起的分发次数
    pub attempt_count: u32,
}

impl Chunk {
    pub fn new(id: ChunkId, start_offset: u64, length: u64) -> Self {
        Self {
            id,
            start_offset,
            length,
            state: ChunkState::Pending,
            assigned_worker: None,
            attempt_count: 0,
        }
    }

    /// 区间结束位置（不含）
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// 一次分块分配的标识，Worker最多持有一个
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub job_id: super::JobId,
    pub chunk_id: ChunkId,
    pub attempt: u32,
}

impl std::fmt::Display for Assignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}@{}", self.job_id, self.chunk_id, self.attempt)
    }
}

/// 单个分块的解析结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkResult {
    pub chunk_id: ChunkId,
    pub error_count: u64,
    pub request_count: u64,
    pub malformed_count: u64,
    /// 响应时间总和（毫秒）
    pub total_response_time: u64,
}

impl ChunkResult {
    pub fn empty(chunk_id: ChunkId) -> Self {
        Self {
            chunk_id,
            ..Self::default()
        }
    }
}
