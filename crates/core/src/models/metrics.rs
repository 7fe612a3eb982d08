use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChunkResult;

/// 作业级别的累计指标
///
/// 只保存原始累加值，比率在读取时计算。对各分块的平均值再求平均只有在
/// 每个分块请求数相同时才成立，这里不能做此假设。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_malformed: u64,
    pub total_response_time: u64,
    pub job_start_time: DateTime<Utc>,
}

impl AggregateMetrics {
    pub fn new(job_start_time: DateTime<Utc>) -> Self {
        Self {
            total_requests: 0,
            total_errors: 0,
            total_malformed: 0,
            total_response_time: 0,
            job_start_time,
        }
    }

    /// 累加一个分块的结果
    pub fn absorb(&mut self, result: &ChunkResult) {
        self.total_requests += result.request_count;
        self.total_errors += result.error_count;
        self.total_malformed += result.malformed_count;
        self.total_response_time += result.total_response_time;
    }

    /// 错误率：错误行数 / 请求行数
    pub fn error_rate(&self) -> f64 {
        self.total_errors as f64 / self.total_requests.max(1) as f64
    }

    /// 平均响应时间（毫秒）
    pub fn avg_response_time(&self) -> f64 {
        self.total_response_time as f64 / self.total_requests.max(1) as f64
    }

    pub fn elapsed_seconds(&self, until: DateTime<Utc>) -> f64 {
        let elapsed = (until - self.job_start_time).num_milliseconds().max(0);
        elapsed as f64 / 1000.0
    }

    /// 吞吐量，经过时间为0时返回0
    pub fn requests_per_second(&self, until: DateTime<Utc>) -> f64 {
        let elapsed = self.elapsed_seconds(until);
        if elapsed <= 0.0 {
            0.0
        } else {
            self.total_requests as f64 / elapsed
        }
    }

    pub fn snapshot(&self, until: DateTime<Utc>) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests,
            total_errors: self.total_errors,
            total_malformed: self.total_malformed,
            total_response_time: self.total_response_time,
            error_rate: self.error_rate(),
            avg_response_time: self.avg_response_time(),
            requests_per_second: self.requests_per_second(until),
            elapsed_seconds: self.elapsed_seconds(until),
            job_start_time: self.job_start_time,
        }
    }
}

/// 对外展示的指标快照，包含派生值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_malformed: u64,
    pub total_response_time: u64,
    pub error_rate: f64,
    pub avg_response_time: f64,
    pub requests_per_second: f64,
    pub elapsed_seconds: f64,
    pub job_start_time: DateTime<Utc>,
}
