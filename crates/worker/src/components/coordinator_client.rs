use analyzer_core::{AnalyzerError, AnalyzerResult, WorkerRegistration};
use reqwest::StatusCode;
use tracing::{debug, error, info, warn};

/// 与协调器通信的客户端：注册、心跳、注销
pub struct CoordinatorClient {
    coordinator_url: String,
    worker_id: String,
    address: String,
    http_client: reqwest::Client,
}

impl CoordinatorClient {
    pub fn new(coordinator_url: String, worker_id: String, address: String, http_client: reqwest::Client) -> Self {
        Self {
            coordinator_url: coordinator_url.trim_end_matches('/').to_string(),
            worker_id,
            address,
            http_client,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub async fn register(&self) -> AnalyzerResult<()> {
        let registration = WorkerRegistration {
            worker_id: self.worker_id.clone(),
            address: self.address.clone(),
        };

        let url = format!("{}/api/v1/workers/register", self.coordinator_url);

        match self.http_client.post(&url).json(&registration).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!(
                        worker_id = %self.worker_id,
                        address = %self.address,
                        "已向协调器注册"
                    );
                    Ok(())
                } else {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    error!("Worker注册失败: HTTP {} - {}", status, body);
                    Err(AnalyzerError::WorkerRejected(format!(
                        "Worker注册失败: HTTP {status} - {body}"
                    )))
                }
            }
            Err(e) => {
                error!("连接协调器注册失败: {}", e);
                Err(AnalyzerError::Network(format!("协调器连接错误: {e}")))
            }
        }
    }

    /// 发送心跳；协调器不认识该Worker时返回 `WorkerNotFound`
    pub async fn send_heartbeat(&self) -> AnalyzerResult<()> {
        let url = format!(
            "{}/api/v1/workers/{}/heartbeat",
            self.coordinator_url, self.worker_id
        );

        match self.http_client.post(&url).send().await {
            Ok(response) => match response.status() {
                status if status.is_success() => {
                    debug!("心跳发送成功: {}", self.worker_id);
                    Ok(())
                }
                StatusCode::NOT_FOUND => Err(AnalyzerError::WorkerNotFound {
                    id: self.worker_id.clone(),
                }),
                status => {
                    warn!("心跳失败: HTTP {}", status);
                    Err(AnalyzerError::Network(format!("心跳失败: HTTP {status}")))
                }
            },
            Err(e) => {
                warn!("发送心跳失败: {}", e);
                Err(AnalyzerError::Network(format!("心跳连接错误: {e}")))
            }
        }
    }

    pub async fn unregister(&self) -> AnalyzerResult<()> {
        let url = format!("{}/api/v1/workers/{}", self.coordinator_url, self.worker_id);

        match self.http_client.delete(&url).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("已从协调器注销: {}", self.worker_id);
                } else {
                    // 协调器可能已清理该Worker
                    warn!("注销Worker失败: HTTP {}", response.status());
                }
                Ok(())
            }
            Err(e) => {
                warn!("注销时连接协调器失败: {}", e);
                Err(AnalyzerError::Network(format!("协调器连接错误: {e}")))
            }
        }
    }
}
