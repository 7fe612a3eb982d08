//! Worker注册表
//!
//! 跨作业持有所有Worker记录。每个变更操作在一次写锁内完成，分配、释放、
//! 心跳和健康扫描互不交错。

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Notify, RwLock};
use tracing::{debug, info, warn};

use analyzer_core::{
    AnalyzerError, AnalyzerResult, Assignment, HealthConfig, WorkerHealth, WorkerInfo,
    WorkerRegistration,
};

const FAILURE_CHANNEL_CAPACITY: usize = 1024;

/// 失败事件产生的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// 心跳超时被判定为Dead
    Dead,
    /// Worker主动注销
    Unregistered,
}

/// Worker持有分块时失联或离开
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEvent {
    pub worker_id: String,
    pub assignment: Assignment,
    pub reason: FailureReason,
}

/// 一次健康扫描的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub suspected: Vec<String>,
    pub dead: Vec<String>,
    pub removed: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.suspected.is_empty() && self.dead.is_empty() && self.removed.is_empty()
    }
}

pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerInfo>>,
    failures: broadcast::Sender<FailureEvent>,
    available: Notify,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    pub fn new() -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            workers: RwLock::new(HashMap::new()),
            failures,
            available: Notify::new(),
        }
    }

    /// 订阅失败事件，调度循环在分发前订阅
    pub fn subscribe_failures(&self) -> broadcast::Receiver<FailureEvent> {
        self.failures.subscribe()
    }

    /// 有Worker注册或被释放时唤醒
    pub async fn worker_available(&self) {
        self.available.notified().await
    }

    /// 注册或刷新Worker，幂等
    ///
    /// 存活的Worker重复注册时保留其当前分块；Dead的Worker重新注册时作为
    /// 全新的Healthy Worker加入。
    pub async fn register(&self, registration: WorkerRegistration) -> WorkerInfo {
        self.register_at(registration, Utc::now()).await
    }

    pub async fn register_at(&self, registration: WorkerRegistration, now: DateTime<Utc>) -> WorkerInfo {
        let mut workers = self.workers.write().await;

        let info = match workers.get_mut(&registration.worker_id) {
            Some(existing) if !existing.is_dead() => {
                existing.address = registration.address;
                existing.health = WorkerHealth::Healthy;
                existing.last_heartbeat = now;
                debug!(worker_id = %existing.id, "Worker重复注册，刷新记录");
                existing.clone()
            }
            _ => {
                let info = WorkerInfo::new(registration, now);
                info!(worker_id = %info.id, address = %info.address, "Worker注册成功");
                workers.insert(info.id.clone(), info.clone());
                info
            }
        };
        drop(workers);

        self.available.notify_waiters();
        info
    }

    /// 处理心跳；未知或已判定Dead的Worker需要重新注册
    pub async fn heartbeat(&self, worker_id: &str) -> AnalyzerResult<()> {
        self.heartbeat_at(worker_id, Utc::now()).await
    }

    pub async fn heartbeat_at(&self, worker_id: &str, now: DateTime<Utc>) -> AnalyzerResult<()> {
        let mut workers = self.workers.write().await;
        match workers.get_mut(worker_id) {
            Some(worker) if !worker.is_dead() => {
                let was_suspected = worker.health == WorkerHealth::Suspected;
                worker.touch(now);
                if was_suspected {
                    info!(worker_id = worker_id, "Worker心跳恢复");
                }
                Ok(())
            }
            _ => Err(AnalyzerError::WorkerNotFound {
                id: worker_id.to_string(),
            }),
        }
    }

    /// Worker主动注销，持有的分块通过失败事件立即重新排队
    pub async fn unregister(&self, worker_id: &str) -> AnalyzerResult<()> {
        let removed = self.workers.write().await.remove(worker_id);
        let Some(worker) = removed else {
            return Err(AnalyzerError::WorkerNotFound {
                id: worker_id.to_string(),
            });
        };

        info!(worker_id = worker_id, "Worker已注销");
        if let Some(assignment) = worker.current_chunk {
            self.emit_failure(worker.id, assignment, FailureReason::Unregistered);
        }
        Ok(())
    }

    /// 为分配领取一个空闲的Healthy Worker
    ///
    /// 优先选择空闲最久的Worker；存在其他候选时避开 `avoid`。
    pub async fn claim_idle(&self, assignment: Assignment, avoid: Option<&str>) -> Option<WorkerInfo> {
        let now = Utc::now();
        let mut workers = self.workers.write().await;

        let mut candidates: Vec<&WorkerInfo> = workers.values().filter(|w| w.is_assignable()).collect();
        if candidates.len() > 1 {
            if let Some(avoid) = avoid {
                candidates.retain(|w| w.id != avoid);
            }
        }
        let selected = candidates
            .into_iter()
            .min_by_key(|w| (w.last_assigned_at.unwrap_or(w.registered_at), w.id.clone()))
            .map(|w| w.id.clone())?;

        let worker = workers.get_mut(&selected)?;
        worker.current_chunk = Some(assignment);
        worker.last_assigned_at = Some(now);
        debug!(worker_id = %worker.id, assignment = %assignment, "Worker领取分块");
        Some(worker.clone())
    }

    /// 分配结束后释放Worker；Worker已不再持有该分配时返回false
    pub async fn release(&self, worker_id: &str, assignment: Assignment) -> bool {
        let released = {
            let mut workers = self.workers.write().await;
            match workers.get_mut(worker_id) {
                Some(worker) if worker.current_chunk == Some(assignment) => {
                    worker.current_chunk = None;
                    true
                }
                _ => false,
            }
        };

        if released {
            self.available.notify_waiters();
        }
        released
    }

    /// 按心跳时长推进健康状态，并清理过期的Dead记录
    pub async fn sweep(&self, now: DateTime<Utc>, config: &HealthConfig) -> SweepReport {
        let suspect_after = Duration::from_millis(config.suspect_after_ms);
        let dead_after = Duration::from_millis(config.dead_after_ms);
        let cleanup_after = Duration::from_millis(config.cleanup_after_ms);

        let mut report = SweepReport::default();
        let mut events = Vec::new();

        {
            let mut workers = self.workers.write().await;
            for worker in workers.values_mut() {
                let age = worker.heartbeat_age(now);
                match worker.health {
                    WorkerHealth::Healthy if age > suspect_after => {
                        worker.health = WorkerHealth::Suspected;
                        warn!(worker_id = %worker.id, age_ms = age.as_millis() as u64, "Worker心跳超时，标记为Suspected");
                        report.suspected.push(worker.id.clone());
                    }
                    WorkerHealth::Suspected if age > dead_after => {
                        worker.health = WorkerHealth::Dead;
                        warn!(worker_id = %worker.id, age_ms = age.as_millis() as u64, "Worker判定为Dead");
                        report.dead.push(worker.id.clone());
                        if let Some(assignment) = worker.current_chunk.take() {
                            events.push((worker.id.clone(), assignment));
                        }
                    }
                    _ => {}
                }
            }

            if config.auto_cleanup_dead_workers {
                workers.retain(|id, worker| {
                    let expired = worker.is_dead() && worker.heartbeat_age(now) > cleanup_after;
                    if expired {
                        report.removed.push(id.clone());
                    }
                    !expired
                });
            }
        }

        for (worker_id, assignment) in events {
            self.emit_failure(worker_id, assignment, FailureReason::Dead);
        }

        report
    }

    fn emit_failure(&self, worker_id: String, assignment: Assignment, reason: FailureReason) {
        warn!(
            worker_id = %worker_id,
            job_id = %assignment.job_id,
            chunk_id = assignment.chunk_id,
            attempt = assignment.attempt,
            reason = ?reason,
            "Worker持有的分块需要重新分配"
        );
        // 没有订阅者时说明没有进行中的作业
        let _ = self.failures.send(FailureEvent {
            worker_id,
            assignment,
            reason,
        });
    }

    pub async fn get(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.workers.read().await.get(worker_id).cloned()
    }

    pub async fn list(&self) -> Vec<WorkerInfo> {
        let mut workers: Vec<WorkerInfo> = self.workers.read().await.values().cloned().collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }

    pub async fn healthy_count(&self) -> usize {
        self.workers.read().await.values().filter(|w| w.is_healthy()).count()
    }

    /// 未判定为Dead的Worker数量
    pub async fn live_count(&self) -> usize {
        self.workers.read().await.values().filter(|w| !w.is_dead()).count()
    }
}
