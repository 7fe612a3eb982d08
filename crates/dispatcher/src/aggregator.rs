use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use analyzer_core::{AggregateMetrics, ChunkId, ChunkResult, MetricsSnapshot};

use crate::telemetry;

#[derive(Debug)]
struct AggregatorState {
    metrics: AggregateMetrics,
    merged: HashSet<ChunkId>,
    finished_at: Option<DateTime<Utc>>,
}

/// 作业级指标聚合器
///
/// 每个分块id最多合并一次，重复的合并请求被拒绝。
#[derive(Debug)]
pub struct MetricsAggregator {
    state: Mutex<AggregatorState>,
}

impl MetricsAggregator {
    pub fn new(job_start_time: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(AggregatorState {
                metrics: AggregateMetrics::new(job_start_time),
                merged: HashSet::new(),
                finished_at: None,
            }),
        }
    }

    /// 合并一个分块结果，该分块已合并过时返回false
    pub async fn merge(&self, result: &ChunkResult) -> bool {
        let mut state = self.state.lock().await;
        if !state.merged.insert(result.chunk_id) {
            debug!(chunk_id = result.chunk_id, "分块结果已合并过，忽略");
            return false;
        }
        state.metrics.absorb(result);
        drop(state);

        telemetry::record_lines(
            result.request_count,
            result.error_count,
            result.malformed_count,
        );
        true
    }

    /// 冻结吞吐量计算的截止时间
    pub async fn finish(&self, at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if state.finished_at.is_none() {
            state.finished_at = Some(at);
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock().await;
        let until = state.finished_at.unwrap_or_else(Utc::now);
        state.metrics.snapshot(until)
    }

    pub async fn merged_chunks(&self) -> usize {
        self.state.lock().await.merged.len()
    }
}
