//! 调度相关的指标
//!
//! 通过 `metrics` 门面记录，未安装exporter时这些调用不产生任何效果。

use metrics::{counter, gauge, histogram};

pub const CHUNKS_DISPATCHED: &str = "analyzer_chunks_dispatched_total";
pub const CHUNKS_COMPLETED: &str = "analyzer_chunks_completed_total";
pub const CHUNKS_REASSIGNED: &str = "analyzer_chunks_reassigned_total";
pub const CHUNKS_FAILED: &str = "analyzer_chunks_failed_total";
pub const STALE_RESULTS: &str = "analyzer_stale_results_discarded_total";
pub const CHUNK_DURATION: &str = "analyzer_chunk_duration_seconds";
pub const WORKERS_DEAD: &str = "analyzer_workers_dead_total";
pub const HEALTHY_WORKERS: &str = "analyzer_healthy_workers";
pub const JOBS_FINISHED: &str = "analyzer_jobs_finished_total";
pub const LINES_REQUESTS: &str = "analyzer_request_lines_total";
pub const LINES_ERRORS: &str = "analyzer_error_lines_total";
pub const LINES_MALFORMED: &str = "analyzer_malformed_lines_total";

pub fn record_chunk_dispatched() {
    counter!(CHUNKS_DISPATCHED).increment(1);
}

pub fn record_chunk_completed(duration_seconds: f64) {
    counter!(CHUNKS_COMPLETED).increment(1);
    histogram!(CHUNK_DURATION).record(duration_seconds);
}

pub fn record_chunk_reassigned(reason: &'static str) {
    counter!(CHUNKS_REASSIGNED, "reason" => reason).increment(1);
}

pub fn record_chunk_failed() {
    counter!(CHUNKS_FAILED).increment(1);
}

pub fn record_stale_result() {
    counter!(STALE_RESULTS).increment(1);
}

pub fn record_worker_dead() {
    counter!(WORKERS_DEAD).increment(1);
}

pub fn set_healthy_workers(count: usize) {
    gauge!(HEALTHY_WORKERS).set(count as f64);
}

pub fn record_job_finished(state: &'static str) {
    counter!(JOBS_FINISHED, "state" => state).increment(1);
}

/// 合并后的行数统计
pub fn record_lines(requests: u64, errors: u64, malformed: u64) {
    counter!(LINES_REQUESTS).increment(requests);
    counter!(LINES_ERRORS).increment(errors);
    counter!(LINES_MALFORMED).increment(malformed);
}
