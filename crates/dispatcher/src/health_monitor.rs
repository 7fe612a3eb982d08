use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use analyzer_core::{AnalyzerResult, HealthConfig};

use crate::registry::{SweepReport, WorkerRegistry};
use crate::telemetry;

/// Worker健康检测服务接口
#[async_trait]
pub trait HealthMonitorService: Send + Sync {
    /// 启动健康检测，直到调用 `stop_monitoring`
    async fn start_monitoring(&self) -> AnalyzerResult<()>;

    /// 停止健康检测
    async fn stop_monitoring(&self) -> AnalyzerResult<()>;

    /// 执行一次检测
    async fn check_workers(&self) -> AnalyzerResult<SweepReport>;
}

/// 基于心跳时长的健康检测
///
/// Healthy的Worker心跳超过 `suspect_after` 变为Suspected，Suspected超过
/// `dead_after` 变为Dead。变为Dead时持有的分块由注册表发出失败事件。
pub struct HealthMonitor {
    registry: Arc<WorkerRegistry>,
    config: HealthConfig,
    running: Arc<RwLock<bool>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<WorkerRegistry>, config: HealthConfig) -> Self {
        Self {
            registry,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// 以给定时间执行一次检测
    pub async fn check_workers_at(&self, now: DateTime<Utc>) -> SweepReport {
        let report = self.registry.sweep(now, &self.config).await;

        if !report.is_empty() {
            info!(
                suspected = report.suspected.len(),
                dead = report.dead.len(),
                removed = report.removed.len(),
                "Worker健康状态变化"
            );
        }
        for _ in &report.dead {
            telemetry::record_worker_dead();
        }
        telemetry::set_healthy_workers(self.registry.healthy_count().await);

        report
    }

    async fn monitoring_loop(&self) {
        info!("启动Worker健康检测循环");

        let mut interval = tokio::time::interval(std::time::Duration::from_millis(
            self.config.check_interval_ms,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            if !*self.running.read().await {
                info!("收到停止信号，退出Worker健康检测循环");
                break;
            }

            let report = self.check_workers_at(Utc::now()).await;
            debug!(?report, "健康检测完成");
        }
    }
}

#[async_trait]
impl HealthMonitorService for HealthMonitor {
    async fn start_monitoring(&self) -> AnalyzerResult<()> {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        self.monitoring_loop().await;
        Ok(())
    }

    async fn stop_monitoring(&self) -> AnalyzerResult<()> {
        info!("停止Worker健康检测服务");

        let mut running = self.running.write().await;
        *running = false;

        Ok(())
    }

    async fn check_workers(&self) -> AnalyzerResult<SweepReport> {
        Ok(self.check_workers_at(Utc::now()).await)
    }
}
