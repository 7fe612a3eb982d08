use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use analyzer_core::{
    classify_line, AnalyzerError, AnalyzerResult, AssignChunkRequest, ChunkId, ChunkResult,
    CoordinatorConfig, HealthConfig, JobState, WorkerInfo, WorkerRegistration, WorkerTransport,
};
use analyzer_dispatcher::{HealthMonitor, HealthMonitorService, JobController, WorkerRegistry};

/// 测试用Worker行为
#[derive(Debug, Clone, Copy)]
enum Behavior {
    Succeed,
    AlwaysFail,
    /// 永不返回
    Hang,
    /// 第一次尝试超时，之后正常
    SlowFirstAttempt(Duration),
    /// 先从注册表注销自己，再返回正确结果
    LeaveThenReply,
    /// 返回无法解析的响应
    Garbled,
}

struct MockTransport {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: AtomicU32,
    calls_per_chunk: Mutex<HashMap<ChunkId, u32>>,
    workers_used: Mutex<Vec<(ChunkId, String)>>,
    registry: Option<Arc<WorkerRegistry>>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
            calls_per_chunk: Mutex::new(HashMap::new()),
            workers_used: Mutex::new(Vec::new()),
            registry: None,
        }
    }

    fn with_registry(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..Self::new()
        }
    }

    fn set(&self, worker_id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(worker_id.to_string(), behavior);
    }

    fn calls_for(&self, chunk_id: ChunkId) -> u32 {
        self.calls_per_chunk
            .lock()
            .unwrap()
            .get(&chunk_id)
            .copied()
            .unwrap_or(0)
    }

    fn workers_for(&self, chunk_id: ChunkId) -> Vec<String> {
        self.workers_used
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == chunk_id)
            .map(|(_, w)| w.clone())
            .collect()
    }
}

/// 按行分类一个已对齐的字节区间
fn analyze_range(request: &AssignChunkRequest) -> ChunkResult {
    let data = std::fs::read(&request.file_path).unwrap();
    let start = request.start_offset as usize;
    let end = start + request.length as usize;
    let mut result = ChunkResult::empty(request.chunk_id);
    for line in String::from_utf8_lossy(&data[start..end]).lines() {
        result.record(classify_line(line));
    }
    result
}

#[async_trait]
impl WorkerTransport for MockTransport {
    async fn assign_chunk(
        &self,
        worker: &WorkerInfo,
        request: AssignChunkRequest,
    ) -> AnalyzerResult<ChunkResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_per_chunk
            .lock()
            .unwrap()
            .entry(request.chunk_id)
            .or_insert(0) += 1;
        self.workers_used
            .lock()
            .unwrap()
            .push((request.chunk_id, worker.id.clone()));

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&worker.id)
            .copied()
            .unwrap_or(Behavior::Succeed);

        match behavior {
            Behavior::Succeed => Ok(analyze_range(&request)),
            Behavior::AlwaysFail => Err(AnalyzerError::WorkerRejected("disk error".to_string())),
            Behavior::Hang => std::future::pending().await,
            Behavior::SlowFirstAttempt(delay) => {
                if request.attempt == 1 {
                    // 超时会取消这个future，结果永远不会送达
                    tokio::time::sleep(delay).await;
                }
                Ok(analyze_range(&request))
            }
            Behavior::Garbled => Err(AnalyzerError::Serialization("expected value at line 1".to_string())),
            Behavior::LeaveThenReply => {
                if let Some(registry) = &self.registry {
                    registry.unregister(&worker.id).await?;
                }
                Ok(analyze_range(&request))
            }
        }
    }
}

struct LogFixture {
    file: NamedTempFile,
    requests: u64,
    errors: u64,
    malformed: u64,
    response_time: u64,
}

fn write_log(lines: usize) -> LogFixture {
    let mut file = NamedTempFile::new().unwrap();
    let (mut requests, mut errors, mut malformed, mut response_time) = (0, 0, 0, 0);
    for i in 0..lines {
        if i % 10 == 3 {
            writeln!(file, "2024-01-01T10:00:{:02}Z ERROR Database timeout on shard {}", i % 60, i).unwrap();
            errors += 1;
        } else if i % 17 == 5 {
            writeln!(file, "corrupted {i}").unwrap();
            malformed += 1;
        } else {
            let rt = 100 + (i as u64 % 100);
            writeln!(file, "2024-01-01T10:00:{:02}Z INFO Request processed in {}ms", i % 60, rt).unwrap();
            requests += 1;
            response_time += rt;
        }
    }
    file.flush().unwrap();
    LogFixture {
        file,
        requests,
        errors,
        malformed,
        response_time,
    }
}

fn coordinator_config() -> CoordinatorConfig {
    CoordinatorConfig {
        listen_address: "127.0.0.1:0".to_string(),
        chunk_size_bytes: 512,
        max_attempts: 3,
        chunk_timeout_ms: 5_000,
        startup_grace_ms: 2_000,
        dispatch_interval_ms: 10,
        progress_interval_ms: 100,
        max_finished_jobs: 100,
    }
}

async fn register(registry: &WorkerRegistry, id: &str) {
    registry
        .register(WorkerRegistration {
            worker_id: id.to_string(),
            address: format!("http://{id}:7071"),
        })
        .await;
}

fn path_of(fixture: &LogFixture) -> String {
    fixture.file.path().to_str().unwrap().to_string()
}

async fn run_with_timeout(controller: &JobController, path: &str) -> analyzer_core::JobStatus {
    tokio::time::timeout(Duration::from_secs(20), controller.run(path))
        .await
        .expect("job did not finish in time")
        .unwrap()
}

#[tokio::test]
async fn test_job_completes_with_exact_totals() {
    let fixture = write_log(400);
    let registry = Arc::new(WorkerRegistry::new());
    for id in ["w1", "w2", "w3"] {
        register(&registry, id).await;
    }
    let transport = Arc::new(MockTransport::new());
    let controller = JobController::new(coordinator_config(), registry.clone(), transport.clone());

    let status = run_with_timeout(&controller, &path_of(&fixture)).await;

    assert_eq!(status.state, JobState::Completed);
    assert!(status.total_chunks > 3);
    assert_eq!(status.completed_chunks, status.total_chunks);
    assert_eq!(status.in_flight_chunks, 0);
    assert!(status.failed_chunks.is_empty());
    assert!(status.finished_at.is_some());
    assert_eq!(status.metrics.total_requests, fixture.requests);
    assert_eq!(status.metrics.total_errors, fixture.errors);
    assert_eq!(status.metrics.total_malformed, fixture.malformed);
    assert_eq!(status.metrics.total_response_time, fixture.response_time);
    assert_eq!(transport.calls.load(Ordering::SeqCst) as usize, status.total_chunks);

    // 所有Worker都已释放
    for worker in registry.list().await {
        assert!(worker.current_chunk.is_none());
    }
}

#[tokio::test]
async fn test_ten_line_example() {
    let mut file = NamedTempFile::new().unwrap();
    for i in 0..8 {
        writeln!(file, "2024-01-01T10:00:0{i}Z INFO Request processed in {}ms", 100 + i * 12).unwrap();
    }
    writeln!(file, "2024-01-01T10:00:08Z ERROR Upstream service unavailable").unwrap();
    writeln!(file, "garbage").unwrap();
    file.flush().unwrap();

    let registry = Arc::new(WorkerRegistry::new());
    register(&registry, "w1").await;
    let controller = JobController::new(
        CoordinatorConfig {
            chunk_size_bytes: 1024 * 1024,
            ..coordinator_config()
        },
        registry,
        Arc::new(MockTransport::new()),
    );

    let status = run_with_timeout(&controller, file.path().to_str().unwrap()).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.total_chunks, 1);
    assert_eq!(status.metrics.total_requests, 8);
    assert_eq!(status.metrics.total_errors, 1);
    assert_eq!(status.metrics.total_malformed, 1);
    assert!((status.metrics.error_rate - 0.125).abs() < 1e-9);
}

#[tokio::test]
async fn test_permanent_failure_after_exactly_max_attempts() {
    let fixture = write_log(10);
    let registry = Arc::new(WorkerRegistry::new());
    register(&registry, "bad").await;
    let transport = Arc::new(MockTransport::new());
    transport.set("bad", Behavior::AlwaysFail);

    let controller = JobController::new(
        CoordinatorConfig {
            chunk_size_bytes: 1024 * 1024,
            ..coordinator_config()
        },
        registry,
        transport.clone(),
    );

    let status = run_with_timeout(&controller, &path_of(&fixture)).await;
    assert_eq!(status.state, JobState::PartiallyFailed);
    assert_eq!(status.failed_chunks, vec![0]);
    assert_eq!(transport.calls_for(0), 3);
    assert_eq!(status.metrics.total_requests, 0);
}

#[tokio::test]
async fn test_failing_worker_is_avoided_on_retry() {
    let fixture = write_log(10);
    let registry = Arc::new(WorkerRegistry::new());
    register(&registry, "bad").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    register(&registry, "good").await;
    let transport = Arc::new(MockTransport::new());
    transport.set("bad", Behavior::AlwaysFail);

    let controller = JobController::new(
        CoordinatorConfig {
            chunk_size_bytes: 1024 * 1024,
            ..coordinator_config()
        },
        registry,
        transport.clone(),
    );

    let status = run_with_timeout(&controller, &path_of(&fixture)).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(transport.workers_for(0), vec!["bad".to_string(), "good".to_string()]);
    assert_eq!(status.metrics.total_requests, fixture.requests);
}

#[tokio::test]
async fn test_unparseable_response_is_retried_elsewhere() {
    let fixture = write_log(10);
    let registry = Arc::new(WorkerRegistry::new());
    register(&registry, "garbled").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    register(&registry, "good").await;
    let transport = Arc::new(MockTransport::new());
    transport.set("garbled", Behavior::Garbled);

    let controller = JobController::new(
        CoordinatorConfig {
            chunk_size_bytes: 1024 * 1024,
            ..coordinator_config()
        },
        registry,
        transport.clone(),
    );

    let status = run_with_timeout(&controller, &path_of(&fixture)).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(transport.workers_for(0), vec!["garbled".to_string(), "good".to_string()]);
    assert_eq!(status.metrics.total_requests, fixture.requests);
}

#[tokio::test]
async fn test_dead_worker_chunk_is_reassigned() {
    let fixture = write_log(10);
    let registry = Arc::new(WorkerRegistry::new());
    register(&registry, "hung").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    register(&registry, "good").await;

    let transport = Arc::new(MockTransport::new());
    transport.set("hung", Behavior::Hang);

    // 只有good发送心跳
    let heartbeat_registry = registry.clone();
    let heartbeats = tokio::spawn(async move {
        loop {
            let _ = heartbeat_registry.heartbeat("good").await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let monitor = Arc::new(HealthMonitor::new(
        registry.clone(),
        HealthConfig {
            check_interval_ms: 20,
            suspect_after_ms: 100,
            dead_after_ms: 200,
            auto_cleanup_dead_workers: false,
            cleanup_after_ms: 60_000,
        },
    ));
    let runner = monitor.clone();
    tokio::spawn(async move { runner.start_monitoring().await });

    let controller = JobController::new(
        CoordinatorConfig {
            chunk_size_bytes: 1024 * 1024,
            // 超时足够长，重新分配只能来自失败事件
            chunk_timeout_ms: 60_000,
            ..coordinator_config()
        },
        registry.clone(),
        transport.clone(),
    );

    let status = run_with_timeout(&controller, &path_of(&fixture)).await;
    monitor.stop_monitoring().await.unwrap();
    heartbeats.abort();

    assert_eq!(status.state, JobState::Completed);
    assert_eq!(transport.workers_for(0), vec!["hung".to_string(), "good".to_string()]);
    assert_eq!(status.metrics.total_requests, fixture.requests);
    assert!(registry.get("hung").await.unwrap().is_dead());
}

#[tokio::test]
async fn test_timed_out_attempt_is_not_merged() {
    let fixture = write_log(10);
    let registry = Arc::new(WorkerRegistry::new());
    register(&registry, "slow").await;
    let transport = Arc::new(MockTransport::new());
    transport.set("slow", Behavior::SlowFirstAttempt(Duration::from_millis(500)));

    let controller = JobController::new(
        CoordinatorConfig {
            chunk_size_bytes: 1024 * 1024,
            chunk_timeout_ms: 100,
            ..coordinator_config()
        },
        registry,
        transport.clone(),
    );

    let status = run_with_timeout(&controller, &path_of(&fixture)).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(transport.calls_for(0), 2);
    assert_eq!(status.metrics.total_requests, fixture.requests);
}

#[tokio::test]
async fn test_unregister_requeues_held_chunk() {
    let fixture = write_log(10);
    let registry = Arc::new(WorkerRegistry::new());
    register(&registry, "leaving").await;
    let transport = Arc::new(MockTransport::new());
    transport.set("leaving", Behavior::Hang);

    let controller = Arc::new(JobController::new(
        CoordinatorConfig {
            chunk_size_bytes: 1024 * 1024,
            chunk_timeout_ms: 60_000,
            ..coordinator_config()
        },
        registry.clone(),
        transport.clone(),
    ));
    let job_id = controller.submit(&path_of(&fixture)).await.unwrap();

    // 等待分块被领取
    for _ in 0..100 {
        if transport.calls_for(0) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(transport.calls_for(0), 1);

    registry.unregister("leaving").await.unwrap();
    register(&registry, "stayer").await;

    let status = tokio::time::timeout(Duration::from_secs(10), controller.wait_for(job_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(transport.workers_for(0), vec!["leaving".to_string(), "stayer".to_string()]);
}

#[tokio::test]
async fn test_result_racing_unregister_counted_once() {
    let fixture = write_log(10);
    let registry = Arc::new(WorkerRegistry::new());
    register(&registry, "leaving").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    register(&registry, "stayer").await;

    let transport = Arc::new(MockTransport::with_registry(registry.clone()));
    transport.set("leaving", Behavior::LeaveThenReply);

    let controller = JobController::new(
        CoordinatorConfig {
            chunk_size_bytes: 1024 * 1024,
            chunk_timeout_ms: 60_000,
            ..coordinator_config()
        },
        registry.clone(),
        transport.clone(),
    );

    let status = run_with_timeout(&controller, &path_of(&fixture)).await;

    // 失败事件和结果哪个先被处理都可以：先处理结果时直接完成，先处理事件时
    // 结果作为过期结果丢弃，由stayer重新执行
    let workers = transport.workers_for(0);
    assert!(
        workers == vec!["leaving".to_string()]
            || workers == vec!["leaving".to_string(), "stayer".to_string()],
        "{workers:?}"
    );
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.completed_chunks, 1);
    assert_eq!(status.metrics.total_requests, fixture.requests);
    assert_eq!(status.metrics.total_errors, fixture.errors);
    assert_eq!(status.metrics.total_malformed, fixture.malformed);
    assert_eq!(status.metrics.total_response_time, fixture.response_time);

    assert!(registry.get("leaving").await.is_none());
    assert!(registry.get("stayer").await.unwrap().current_chunk.is_none());
}

#[tokio::test]
async fn test_idle_then_join() {
    let fixture = write_log(50);
    let registry = Arc::new(WorkerRegistry::new());
    let controller = JobController::new(coordinator_config(), registry.clone(), Arc::new(MockTransport::new()));

    let job_id = controller.submit(&path_of(&fixture)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = controller.job_status(job_id).await.unwrap();
    assert_eq!(status.state, JobState::Dispatching);
    assert_eq!(status.completed_chunks, 0);

    register(&registry, "late").await;
    let status = tokio::time::timeout(Duration::from_secs(10), controller.wait_for(job_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.metrics.total_requests, fixture.requests);
}

#[tokio::test]
async fn test_aborted_without_workers() {
    let fixture = write_log(10);
    let controller = JobController::new(
        CoordinatorConfig {
            startup_grace_ms: 150,
            ..coordinator_config()
        },
        Arc::new(WorkerRegistry::new()),
        Arc::new(MockTransport::new()),
    );

    let status = run_with_timeout(&controller, &path_of(&fixture)).await;
    assert_eq!(status.state, JobState::Aborted);
    assert_eq!(status.completed_chunks, 0);
    assert!(status.error.is_some());
}

#[tokio::test]
async fn test_zero_length_file_needs_no_worker() {
    let file = NamedTempFile::new().unwrap();
    let controller = JobController::new(
        coordinator_config(),
        Arc::new(WorkerRegistry::new()),
        Arc::new(MockTransport::new()),
    );

    let status = run_with_timeout(&controller, file.path().to_str().unwrap()).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.total_chunks, 1);
    assert_eq!(status.completed_chunks, 1);
    assert_eq!(status.metrics.total_requests, 0);
    assert_eq!(status.metrics.error_rate, 0.0);
}

#[tokio::test]
async fn test_concurrent_jobs_share_workers() {
    let first = write_log(300);
    let second = write_log(120);
    let registry = Arc::new(WorkerRegistry::new());
    register(&registry, "w1").await;
    register(&registry, "w2").await;
    let controller = Arc::new(JobController::new(
        coordinator_config(),
        registry,
        Arc::new(MockTransport::new()),
    ));

    let a = controller.submit(&path_of(&first)).await.unwrap();
    let b = controller.submit(&path_of(&second)).await.unwrap();
    assert_ne!(a, b);

    let status_a = controller.wait_for(a).await.unwrap();
    let status_b = controller.wait_for(b).await.unwrap();
    assert_eq!(status_a.metrics.total_requests, first.requests);
    assert_eq!(status_b.metrics.total_requests, second.requests);
    assert_eq!(controller.list_jobs().await.len(), 2);
}

#[tokio::test]
async fn test_oldest_finished_jobs_are_evicted() {
    let fixture = write_log(50);
    let registry = Arc::new(WorkerRegistry::new());
    register(&registry, "w1").await;
    let controller = JobController::new(
        CoordinatorConfig {
            max_finished_jobs: 2,
            ..coordinator_config()
        },
        registry,
        Arc::new(MockTransport::new()),
    );

    let mut job_ids = Vec::new();
    for _ in 0..3 {
        let status = run_with_timeout(&controller, &path_of(&fixture)).await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.metrics.total_requests, fixture.requests);
        job_ids.push(status.job_id);
    }

    let result = controller.job_status(job_ids[0]).await;
    assert!(matches!(result, Err(AnalyzerError::JobNotFound { .. })));
    assert!(controller.job_status(job_ids[1]).await.is_ok());
    assert!(controller.job_status(job_ids[2]).await.is_ok());

    let listed: Vec<_> = controller
        .list_jobs()
        .await
        .into_iter()
        .map(|status| status.job_id)
        .collect();
    assert_eq!(listed, job_ids[1..].to_vec());
}

#[tokio::test]
async fn test_missing_file_and_unknown_job() {
    let controller = JobController::new(
        coordinator_config(),
        Arc::new(WorkerRegistry::new()),
        Arc::new(MockTransport::new()),
    );

    let result = controller.submit("/nonexistent/app.log").await;
    assert!(matches!(result, Err(AnalyzerError::FileNotFound { .. })));

    let result = controller.job_status(uuid::Uuid::new_v4()).await;
    assert!(matches!(result, Err(AnalyzerError::JobNotFound { .. })));
}
