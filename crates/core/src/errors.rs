use thiserror::Error;

use crate::models::{ChunkId, JobId};

/// 分析器错误类型定义
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("日志文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },

    #[error("作业未找到: {id}")]
    JobNotFound { id: JobId },

    #[error("无效的分块范围: offset={start_offset}, length={length}, file_size={file_size}")]
    InvalidChunkRange {
        start_offset: u64,
        length: u64,
        file_size: u64,
    },

    #[error("分块 {chunk_id} 在Worker {worker_id} 上执行超时")]
    ChunkTimeout { chunk_id: ChunkId, worker_id: String },

    #[error("Worker拒绝了分块请求: {0}")]
    WorkerRejected(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的请求: {0}")]
    InvalidRequest(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl AnalyzerError {
    /// 是否属于可通过重新分配恢复的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalyzerError::ChunkTimeout { .. }
                | AnalyzerError::Network(_)
                | AnalyzerError::WorkerRejected(_)
                | AnalyzerError::Io(_)
        )
    }
}

impl From<serde_json::Error> for AnalyzerError {
    fn from(err: serde_json::Error) -> Self {
        AnalyzerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type AnalyzerResult<T> = std::result::Result<T, AnalyzerError>;
