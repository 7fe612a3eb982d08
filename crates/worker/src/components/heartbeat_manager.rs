use std::sync::Arc;
use std::time::Duration;

use analyzer_core::AnalyzerError;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use super::CoordinatorClient;

/// 定期向协调器发送心跳
///
/// 协调器返回未找到（重启过或已判定Dead）时重新注册。
pub struct HeartbeatManager {
    heartbeat_interval: Duration,
    coordinator_client: Arc<CoordinatorClient>,
}

impl HeartbeatManager {
    pub fn new(heartbeat_interval: Duration, coordinator_client: Arc<CoordinatorClient>) -> Self {
        Self {
            heartbeat_interval,
            coordinator_client,
        }
    }

    pub fn start_heartbeat_task(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let mut heartbeat_interval = interval(self.heartbeat_interval);
        let coordinator_client = Arc::clone(&self.coordinator_client);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = heartbeat_interval.tick() => {
                        match coordinator_client.send_heartbeat().await {
                            Ok(()) => {}
                            Err(AnalyzerError::WorkerNotFound { .. }) => {
                                warn!(worker_id = coordinator_client.worker_id(), "协调器未找到该Worker，重新注册");
                                if let Err(e) = coordinator_client.register().await {
                                    error!("重新注册失败: {}", e);
                                }
                            }
                            Err(e) => {
                                error!("发送心跳失败: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("心跳任务退出");
                        break;
                    }
                }
            }
        })
    }
}
