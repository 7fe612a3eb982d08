//! 单个作业的调度循环
//!
//! 循环独占该作业的分块表。每个进行中的 `AssignChunk` 在独立任务中执行，
//! 结果经mpsc通道回到循环；Worker失效通过注册表的广播通道送达。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use analyzer_core::{
    AnalyzerError, AnalyzerResult, AssignChunkRequest, Assignment, Chunk, ChunkId, ChunkResult,
    CoordinatorConfig, JobId, JobState, WorkerTransport,
};

use crate::aggregator::MetricsAggregator;
use crate::chunk_table::{ChunkTable, DispatchProgress, FailureOutcome};
use crate::registry::{FailureEvent, FailureReason, WorkerRegistry};
use crate::telemetry;

/// 分块请求任务的返回
#[derive(Debug)]
struct ChunkOutcome {
    chunk_id: ChunkId,
    worker_id: String,
    attempt: u32,
    started_at: Instant,
    result: AnalyzerResult<ChunkResult>,
}

#[derive(Debug)]
struct InFlight {
    worker_id: String,
    attempt: u32,
    abort: AbortHandle,
}

/// 调度结束时的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub state: JobState,
    pub failed_chunks: Vec<ChunkId>,
}

pub struct ChunkDispatcher {
    job_id: JobId,
    file_path: String,
    config: CoordinatorConfig,
    registry: Arc<WorkerRegistry>,
    transport: Arc<dyn WorkerTransport>,
    aggregator: Arc<MetricsAggregator>,
    progress: watch::Sender<DispatchProgress>,
}

impl ChunkDispatcher {
    pub fn new(
        job_id: JobId,
        file_path: String,
        config: CoordinatorConfig,
        registry: Arc<WorkerRegistry>,
        transport: Arc<dyn WorkerTransport>,
        aggregator: Arc<MetricsAggregator>,
        progress: watch::Sender<DispatchProgress>,
    ) -> Self {
        Self {
            job_id,
            file_path,
            config,
            registry,
            transport,
            aggregator,
            progress,
        }
    }

    /// 分发所有分块直到进入终止状态
    pub async fn run(self, chunks: Vec<Chunk>) -> DispatchReport {
        // 在第一次分发之前订阅，避免错过失败事件
        let mut failures = self.registry.subscribe_failures();
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        let mut table = ChunkTable::new(chunks, self.config.max_attempts);
        let mut in_flight: HashMap<ChunkId, InFlight> = HashMap::new();

        for chunk_id in table.complete_empty_chunks() {
            debug!(job_id = %self.job_id, chunk_id = chunk_id, "空分块直接完成");
            self.aggregator.merge(&ChunkResult::empty(chunk_id)).await;
        }

        let grace_deadline = Instant::now() + self.config.startup_grace();
        let mut seen_worker = false;

        let mut dispatch_tick = tokio::time::interval(self.config.dispatch_interval());
        dispatch_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut progress_tick = tokio::time::interval(self.config.progress_interval());
        progress_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        progress_tick.tick().await;

        info!(
            job_id = %self.job_id,
            total_chunks = table.progress().total_chunks,
            "开始分发分块"
        );

        loop {
            if table.is_finished() {
                break;
            }

            if table.has_pending() {
                if !seen_worker && self.registry.live_count().await > 0 {
                    seen_worker = true;
                }
                if !seen_worker && Instant::now() >= grace_deadline {
                    warn!(
                        job_id = %self.job_id,
                        grace_ms = self.config.startup_grace_ms,
                        "启动宽限期内没有可用的Worker，终止作业"
                    );
                    self.progress.send_replace(table.progress());
                    return DispatchReport {
                        state: JobState::Aborted,
                        failed_chunks: table.failed_chunks(),
                    };
                }

                self.dispatch_pending(&mut table, &mut in_flight, &outcome_tx)
                    .await;
                if !in_flight.is_empty() {
                    seen_worker = true;
                }
            }

            self.progress.send_replace(table.progress());

            tokio::select! {
                Some(outcome) = outcome_rx.recv() => {
                    self.handle_outcome(&mut table, &mut in_flight, outcome).await;
                }
                event = failures.recv() => match event {
                    Ok(event) => self.handle_failure_event(&mut table, &mut in_flight, event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // 丢失的事件由分块超时兜底
                        warn!(job_id = %self.job_id, skipped = skipped, "失败事件积压，部分事件被跳过");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!(job_id = %self.job_id, "失败事件通道已关闭");
                    }
                },
                _ = self.registry.worker_available() => {}
                _ = dispatch_tick.tick() => {}
                _ = progress_tick.tick() => {
                    self.report_progress(&table).await;
                }
            }
        }

        self.progress.send_replace(table.progress());
        let failed_chunks = table.failed_chunks();
        let state = if failed_chunks.is_empty() {
            JobState::Completed
        } else {
            JobState::PartiallyFailed
        };

        info!(
            job_id = %self.job_id,
            state = %state,
            failed_chunks = failed_chunks.len(),
            "分块分发结束"
        );

        DispatchReport {
            state,
            failed_chunks,
        }
    }

    /// 为待分发分块领取空闲Worker，直到没有待分发分块或没有空闲Worker
    async fn dispatch_pending(
        &self,
        table: &mut ChunkTable,
        in_flight: &mut HashMap<ChunkId, InFlight>,
        outcome_tx: &mpsc::UnboundedSender<ChunkOutcome>,
    ) {
        while let Some(chunk_id) = table.next_pending() {
            let (Some(attempt), Some(chunk)) = (table.next_attempt(chunk_id), table.get(chunk_id))
            else {
                break;
            };
            let (start_offset, length) = (chunk.start_offset, chunk.length);

            let assignment = Assignment {
                job_id: self.job_id,
                chunk_id,
                attempt,
            };
            let avoid = table.last_failed_worker(chunk_id).map(str::to_string);
            let Some(worker) = self.registry.claim_idle(assignment, avoid.as_deref()).await else {
                break;
            };

            match table.assign(chunk_id, &worker.id) {
                Ok(assigned) if assigned == attempt => {}
                other => {
                    error!(job_id = %self.job_id, chunk_id = chunk_id, "分块分配状态异常: {:?}", other);
                    self.registry.release(&worker.id, assignment).await;
                    break;
                }
            }

            let request = AssignChunkRequest {
                job_id: self.job_id,
                chunk_id,
                attempt,
                file_path: self.file_path.clone(),
                start_offset,
                length,
            };

            info!(
                job_id = %self.job_id,
                chunk_id = chunk_id,
                worker_id = %worker.id,
                attempt = attempt,
                "分发分块"
            );

            let transport = self.transport.clone();
            let tx = outcome_tx.clone();
            let chunk_timeout = self.config.chunk_timeout();
            let worker_id = worker.id.clone();

            let handle = tokio::spawn(async move {
                let started_at = Instant::now();
                let result =
                    match tokio::time::timeout(chunk_timeout, transport.assign_chunk(&worker, request)).await {
                        Ok(result) => result,
                        Err(_) => Err(AnalyzerError::ChunkTimeout {
                            chunk_id,
                            worker_id: worker.id.clone(),
                        }),
                    };
                // 循环已退出时丢弃结果
                let _ = tx.send(ChunkOutcome {
                    chunk_id,
                    worker_id: worker.id,
                    attempt,
                    started_at,
                    result,
                });
            });

            if let Err(e) = table.mark_in_progress(chunk_id) {
                error!(job_id = %self.job_id, chunk_id = chunk_id, "更新分块状态失败: {}", e);
            }
            in_flight.insert(
                chunk_id,
                InFlight {
                    worker_id,
                    attempt,
                    abort: handle.abort_handle(),
                },
            );
            telemetry::record_chunk_dispatched();
        }
    }

    async fn handle_outcome(
        &self,
        table: &mut ChunkTable,
        in_flight: &mut HashMap<ChunkId, InFlight>,
        outcome: ChunkOutcome,
    ) {
        let is_current = in_flight
            .get(&outcome.chunk_id)
            .is_some_and(|f| f.worker_id == outcome.worker_id && f.attempt == outcome.attempt);
        if !is_current {
            debug!(
                job_id = %self.job_id,
                chunk_id = outcome.chunk_id,
                worker_id = %outcome.worker_id,
                attempt = outcome.attempt,
                "丢弃过期的分块结果"
            );
            telemetry::record_stale_result();
            return;
        }
        in_flight.remove(&outcome.chunk_id);

        let assignment = Assignment {
            job_id: self.job_id,
            chunk_id: outcome.chunk_id,
            attempt: outcome.attempt,
        };
        self.registry.release(&outcome.worker_id, assignment).await;

        match outcome.result {
            Ok(mut result) => {
                result.chunk_id = outcome.chunk_id;
                if !table.complete(outcome.chunk_id, &outcome.worker_id, outcome.attempt) {
                    telemetry::record_stale_result();
                    return;
                }
                if self.aggregator.merge(&result).await {
                    telemetry::record_chunk_completed(outcome.started_at.elapsed().as_secs_f64());
                    debug!(
                        job_id = %self.job_id,
                        chunk_id = outcome.chunk_id,
                        worker_id = %outcome.worker_id,
                        requests = result.request_count,
                        errors = result.error_count,
                        malformed = result.malformed_count,
                        "分块完成"
                    );
                }
            }
            Err(e) => {
                let reason = match &e {
                    AnalyzerError::ChunkTimeout { .. } => "timeout",
                    e if e.is_transient() => "error",
                    _ => "invalid_response",
                };
                if e.is_transient() {
                    warn!(
                        job_id = %self.job_id,
                        chunk_id = outcome.chunk_id,
                        worker_id = %outcome.worker_id,
                        attempt = outcome.attempt,
                        "分块执行失败: {}",
                        e
                    );
                } else {
                    // 换一个Worker仍可能成功，照常重新排队
                    error!(
                        job_id = %self.job_id,
                        chunk_id = outcome.chunk_id,
                        worker_id = %outcome.worker_id,
                        attempt = outcome.attempt,
                        "Worker返回了无法解析的结果: {}",
                        e
                    );
                }
                self.record_failure(table, outcome.chunk_id, &outcome.worker_id, outcome.attempt, reason);
            }
        }
    }

    async fn handle_failure_event(
        &self,
        table: &mut ChunkTable,
        in_flight: &mut HashMap<ChunkId, InFlight>,
        event: FailureEvent,
    ) {
        if event.assignment.job_id != self.job_id {
            return;
        }

        let chunk_id = event.assignment.chunk_id;
        let matches = in_flight
            .get(&chunk_id)
            .is_some_and(|f| f.worker_id == event.worker_id && f.attempt == event.assignment.attempt);
        if !matches {
            return;
        }

        if let Some(flight) = in_flight.remove(&chunk_id) {
            flight.abort.abort();
        }
        // Worker已注销或Dead时release不生效
        self.registry.release(&event.worker_id, event.assignment).await;

        let reason = match event.reason {
            FailureReason::Dead => "worker_dead",
            FailureReason::Unregistered => "worker_unregistered",
        };
        self.record_failure(table, chunk_id, &event.worker_id, event.assignment.attempt, reason);
    }

    fn record_failure(
        &self,
        table: &mut ChunkTable,
        chunk_id: ChunkId,
        worker_id: &str,
        attempt: u32,
        reason: &'static str,
    ) {
        match table.fail(chunk_id, worker_id, attempt) {
            FailureOutcome::Requeued => {
                telemetry::record_chunk_reassigned(reason);
                info!(
                    job_id = %self.job_id,
                    chunk_id = chunk_id,
                    worker_id = worker_id,
                    attempt = attempt,
                    reason = reason,
                    "分块重新排队"
                );
            }
            FailureOutcome::PermanentlyFailed => {
                telemetry::record_chunk_failed();
                error!(
                    job_id = %self.job_id,
                    chunk_id = chunk_id,
                    attempts = attempt,
                    "分块达到最大分发次数，标记为失败"
                );
            }
            FailureOutcome::Stale => {
                telemetry::record_stale_result();
            }
        }
    }

    async fn report_progress(&self, table: &ChunkTable) {
        let progress = table.progress();
        let metrics = self.aggregator.snapshot().await;
        info!(
            job_id = %self.job_id,
            completed = progress.completed_chunks,
            total = progress.total_chunks,
            in_flight = progress.in_flight_chunks,
            failed = progress.failed_chunks.len(),
            total_requests = metrics.total_requests,
            error_rate = metrics.error_rate,
            avg_response_time_ms = metrics.avg_response_time,
            requests_per_second = metrics.requests_per_second,
            "作业进度"
        );
    }
}
