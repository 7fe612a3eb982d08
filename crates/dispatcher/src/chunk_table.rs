//! 单个作业的分块状态表
//!
//! 只由该作业的调度循环持有和修改。状态迁移：
//! `Pending -> Assigned -> InProgress -> Completed`，失败时回到 `Pending`，
//! 分发次数用尽后进入 `Failed`。

use std::collections::{BTreeSet, HashMap};

use analyzer_core::{AnalyzerError, AnalyzerResult, Chunk, ChunkId, ChunkState};

/// 一次失败上报的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// 重新排队等待下一次分发
    Requeued,
    /// 分发次数用尽，永久失败
    PermanentlyFailed,
    /// 与当前分配不符，忽略
    Stale,
}

/// 调度进度，用于状态查询和进度日志
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchProgress {
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub in_flight_chunks: usize,
    pub failed_chunks: Vec<ChunkId>,
}

#[derive(Debug)]
pub struct ChunkTable {
    chunks: Vec<Chunk>,
    /// 按文件顺序排列的待分发分块
    pending: BTreeSet<ChunkId>,
    /// 最近一次让该分块失败的Worker
    last_failed_by: HashMap<ChunkId, String>,
    max_attempts: u32,
}

impl ChunkTable {
    /// `chunks` 必须按id连续排列，id即下标
    pub fn new(chunks: Vec<Chunk>, max_attempts: u32) -> Self {
        let pending = chunks
            .iter()
            .filter(|c| c.state == ChunkState::Pending)
            .map(|c| c.id)
            .collect();
        Self {
            chunks,
            pending,
            last_failed_by: HashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn get(&self, chunk_id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(chunk_id as usize)
    }

    fn get_mut(&mut self, chunk_id: ChunkId) -> AnalyzerResult<&mut Chunk> {
        self.chunks
            .get_mut(chunk_id as usize)
            .ok_or_else(|| AnalyzerError::Internal(format!("分块不存在: {chunk_id}")))
    }

    /// 直接完成所有零长度分块，返回其id
    pub fn complete_empty_chunks(&mut self) -> Vec<ChunkId> {
        let empty: Vec<ChunkId> = self
            .pending
            .iter()
            .copied()
            .filter(|id| self.chunks[*id as usize].is_empty())
            .collect();
        for id in &empty {
            self.pending.remove(id);
            self.chunks[*id as usize].state = ChunkState::Completed;
        }
        empty
    }

    /// 文件顺序中最靠前的待分发分块
    pub fn next_pending(&self) -> Option<ChunkId> {
        self.pending.iter().next().copied()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// 下一次分发对应的尝试序号
    pub fn next_attempt(&self, chunk_id: ChunkId) -> Option<u32> {
        self.get(chunk_id).map(|c| c.attempt_count + 1)
    }

    pub fn last_failed_worker(&self, chunk_id: ChunkId) -> Option<&str> {
        self.last_failed_by.get(&chunk_id).map(String::as_str)
    }

    /// Pending -> Assigned，返回本次尝试序号
    pub fn assign(&mut self, chunk_id: ChunkId, worker_id: &str) -> AnalyzerResult<u32> {
        let chunk = self.get_mut(chunk_id)?;
        if chunk.state != ChunkState::Pending {
            return Err(AnalyzerError::Internal(format!(
                "分块 {} 当前状态为 {:?}，不能分配",
                chunk_id, chunk.state
            )));
        }

        chunk.state = ChunkState::Assigned;
        chunk.assigned_worker = Some(worker_id.to_string());
        chunk.attempt_count += 1;
        let attempt = chunk.attempt_count;
        self.pending.remove(&chunk_id);
        Ok(attempt)
    }

    /// Assigned -> InProgress，请求已发出
    pub fn mark_in_progress(&mut self, chunk_id: ChunkId) -> AnalyzerResult<()> {
        let chunk = self.get_mut(chunk_id)?;
        if chunk.state == ChunkState::Assigned {
            chunk.state = ChunkState::InProgress;
        }
        Ok(())
    }

    fn is_current(&self, chunk_id: ChunkId, worker_id: &str, attempt: u32) -> bool {
        self.get(chunk_id).is_some_and(|c| {
            c.state.is_active()
                && c.attempt_count == attempt
                && c.assigned_worker.as_deref() == Some(worker_id)
        })
    }

    /// 标记完成；结果不属于当前分配时返回false，调用方应丢弃该结果
    pub fn complete(&mut self, chunk_id: ChunkId, worker_id: &str, attempt: u32) -> bool {
        if !self.is_current(chunk_id, worker_id, attempt) {
            return false;
        }
        let chunk = &mut self.chunks[chunk_id as usize];
        chunk.state = ChunkState::Completed;
        true
    }

    /// 记录一次失败的尝试
    pub fn fail(&mut self, chunk_id: ChunkId, worker_id: &str, attempt: u32) -> FailureOutcome {
        if !self.is_current(chunk_id, worker_id, attempt) {
            return FailureOutcome::Stale;
        }

        self.last_failed_by.insert(chunk_id, worker_id.to_string());
        let max_attempts = self.max_attempts;
        let chunk = &mut self.chunks[chunk_id as usize];
        chunk.assigned_worker = None;

        if chunk.attempt_count >= max_attempts {
            chunk.state = ChunkState::Failed;
            FailureOutcome::PermanentlyFailed
        } else {
            chunk.state = ChunkState::Pending;
            self.pending.insert(chunk_id);
            FailureOutcome::Requeued
        }
    }

    /// 所有分块都已进入终止状态
    pub fn is_finished(&self) -> bool {
        self.chunks.iter().all(|c| c.state.is_terminal())
    }

    pub fn failed_chunks(&self) -> Vec<ChunkId> {
        self.chunks
            .iter()
            .filter(|c| c.state == ChunkState::Failed)
            .map(|c| c.id)
            .collect()
    }

    pub fn progress(&self) -> DispatchProgress {
        let mut progress = DispatchProgress {
            total_chunks: self.chunks.len(),
            ..Default::default()
        };
        for chunk in &self.chunks {
            match chunk.state {
                ChunkState::Completed => progress.completed_chunks += 1,
                ChunkState::Assigned | ChunkState::InProgress => progress.in_flight_chunks += 1,
                ChunkState::Failed => progress.failed_chunks.push(chunk.id),
                ChunkState::Pending => {}
            }
        }
        progress
    }
}
