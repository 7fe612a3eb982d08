use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use analyzer_core::{
    AnalyzerError, AnalyzerResult, CoordinatorConfig, JobId, JobState, JobStatus, WorkerTransport,
};

use crate::aggregator::MetricsAggregator;
use crate::chunk_table::DispatchProgress;
use crate::dispatcher::ChunkDispatcher;
use crate::planner::ChunkPlanner;
use crate::registry::WorkerRegistry;
use crate::telemetry;

/// 单个作业的运行记录
struct JobEntry {
    job_id: JobId,
    file_path: String,
    file_size: u64,
    submitted_at: DateTime<Utc>,
    aggregator: Arc<MetricsAggregator>,
    state: watch::Sender<JobState>,
    progress: watch::Receiver<DispatchProgress>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
    error: RwLock<Option<String>>,
}

impl JobEntry {
    async fn status(&self) -> JobStatus {
        let progress = self.progress.borrow().clone();
        let state = *self.state.borrow();
        JobStatus {
            job_id: self.job_id,
            file_path: self.file_path.clone(),
            file_size: self.file_size,
            state,
            total_chunks: progress.total_chunks,
            completed_chunks: progress.completed_chunks,
            in_flight_chunks: progress.in_flight_chunks,
            failed_chunks: progress.failed_chunks,
            metrics: self.aggregator.snapshot().await,
            submitted_at: self.submitted_at,
            finished_at: *self.finished_at.read().await,
            error: self.error.read().await.clone(),
        }
    }

    async fn finish(&self, state: JobState, error: Option<String>, jobs: &JobTable, keep: usize) {
        let now = Utc::now();
        self.aggregator.finish(now).await;
        *self.finished_at.write().await = Some(now);
        *self.error.write().await = error;
        // 淘汰须在发布终止状态之前完成
        evict_finished(jobs, self.job_id, keep).await;
        self.state.send_replace(state);
        telemetry::record_job_finished(state.as_str());
    }
}

type JobTable = RwLock<HashMap<JobId, Arc<JobEntry>>>;

/// 只保留最近结束的 `keep` 个作业，运行中的作业不受影响
async fn evict_finished(jobs: &JobTable, current: JobId, keep: usize) {
    let mut jobs = jobs.write().await;

    let mut finished = Vec::new();
    for (job_id, entry) in jobs.iter() {
        if *job_id == current {
            continue;
        }
        if let Some(finished_at) = *entry.finished_at.read().await {
            finished.push((finished_at, entry.submitted_at, *job_id));
        }
    }

    // current本身占一个名额
    let retained = keep.saturating_sub(1);
    if finished.len() <= retained {
        return;
    }

    finished.sort();
    let excess = finished.len() - retained;
    for (finished_at, _, job_id) in finished.into_iter().take(excess) {
        jobs.remove(&job_id);
        debug!(job_id = %job_id, finished_at = %finished_at, "移除过期的作业记录");
    }
    info!(evicted = excess, retained = jobs.len(), "已结束作业超出保留数量");
}

/// 作业控制器：规划、分发、聚合
///
/// 多个作业可以同时运行，通过注册表竞争Worker。
pub struct JobController {
    config: CoordinatorConfig,
    registry: Arc<WorkerRegistry>,
    transport: Arc<dyn WorkerTransport>,
    jobs: Arc<JobTable>,
}

impl JobController {
    pub fn new(
        config: CoordinatorConfig,
        registry: Arc<WorkerRegistry>,
        transport: Arc<dyn WorkerTransport>,
    ) -> Self {
        Self {
            config,
            registry,
            transport,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// 提交作业并在后台运行，返回作业id
    pub async fn submit(&self, file_path: &str) -> AnalyzerResult<JobId> {
        let metadata = match tokio::fs::metadata(file_path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AnalyzerError::FileNotFound {
                    path: file_path.to_string(),
                })
            }
            Err(e) => return Err(AnalyzerError::Io(e)),
        };
        if !metadata.is_file() {
            return Err(AnalyzerError::InvalidRequest(format!(
                "不是普通文件: {file_path}"
            )));
        }

        let job_id = Uuid::new_v4();
        let submitted_at = Utc::now();
        let (state, _) = watch::channel(JobState::Planning);
        let (progress_tx, progress) = watch::channel(DispatchProgress::default());

        let entry = Arc::new(JobEntry {
            job_id,
            file_path: file_path.to_string(),
            file_size: metadata.len(),
            submitted_at,
            aggregator: Arc::new(MetricsAggregator::new(submitted_at)),
            state,
            progress,
            finished_at: RwLock::new(None),
            error: RwLock::new(None),
        });
        self.jobs.write().await.insert(job_id, entry.clone());

        info!(job_id = %job_id, file_path = file_path, file_size = metadata.len(), "作业已提交");

        let config = self.config.clone();
        let registry = self.registry.clone();
        let transport = self.transport.clone();
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            run_job(entry, progress_tx, config, registry, transport, jobs).await;
        });

        Ok(job_id)
    }

    /// 提交作业并等待其结束
    pub async fn run(&self, file_path: &str) -> AnalyzerResult<JobStatus> {
        let job_id = self.submit(file_path).await?;
        self.wait_for(job_id).await
    }

    /// 等待作业进入终止状态
    pub async fn wait_for(&self, job_id: JobId) -> AnalyzerResult<JobStatus> {
        let entry = self.entry(job_id).await?;
        let mut state = entry.state.subscribe();
        state
            .wait_for(|s| s.is_terminal())
            .await
            .map_err(|_| AnalyzerError::Internal(format!("作业 {job_id} 状态通道已关闭")))?;
        Ok(entry.status().await)
    }

    pub async fn job_status(&self, job_id: JobId) -> AnalyzerResult<JobStatus> {
        Ok(self.entry(job_id).await?.status().await)
    }

    pub async fn list_jobs(&self) -> Vec<JobStatus> {
        let entries: Vec<Arc<JobEntry>> = self.jobs.read().await.values().cloned().collect();
        let mut statuses = Vec::with_capacity(entries.len());
        for entry in entries {
            statuses.push(entry.status().await);
        }
        statuses.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        statuses
    }

    async fn entry(&self, job_id: JobId) -> AnalyzerResult<Arc<JobEntry>> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(AnalyzerError::JobNotFound { id: job_id })
    }
}

async fn run_job(
    entry: Arc<JobEntry>,
    progress: watch::Sender<DispatchProgress>,
    config: CoordinatorConfig,
    registry: Arc<WorkerRegistry>,
    transport: Arc<dyn WorkerTransport>,
    jobs: Arc<JobTable>,
) {
    let keep = config.max_finished_jobs;
    let planner = ChunkPlanner::new(config.chunk_size_bytes);
    let chunks = match planner
        .plan_file_with_size(Path::new(&entry.file_path), entry.file_size)
        .await
    {
        Ok(chunks) => chunks,
        Err(e) => {
            error!(job_id = %entry.job_id, "分块规划失败: {}", e);
            entry
                .finish(JobState::Aborted, Some(e.to_string()), &jobs, keep)
                .await;
            return;
        }
    };

    progress.send_replace(DispatchProgress {
        total_chunks: chunks.len(),
        ..Default::default()
    });
    entry.state.send_replace(JobState::Dispatching);

    let dispatcher = ChunkDispatcher::new(
        entry.job_id,
        entry.file_path.clone(),
        config,
        registry,
        transport,
        entry.aggregator.clone(),
        progress,
    );
    let report = dispatcher.run(chunks).await;

    let error = match report.state {
        JobState::Aborted => Some("启动宽限期内没有可用的Worker".to_string()),
        _ => None,
    };
    entry.finish(report.state, error, &jobs, keep).await;

    let status = entry.status().await;
    info!(
        job_id = %entry.job_id,
        state = %status.state,
        completed_chunks = status.completed_chunks,
        failed_chunks = status.failed_chunks.len(),
        total_requests = status.metrics.total_requests,
        error_rate = status.metrics.error_rate,
        avg_response_time_ms = status.metrics.avg_response_time,
        requests_per_second = status.metrics.requests_per_second,
        "作业结束"
    );
}
