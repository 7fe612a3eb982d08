use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use analyzer_core::{AnalyzerError, AnalyzerResult, WorkerConfig};

use crate::components::{CoordinatorClient, HeartbeatManager};
use crate::processor::ChunkProcessor;
use crate::server::{create_worker_routes, WorkerState};

/// Worker服务构建器
pub struct WorkerServiceBuilder {
    config: WorkerConfig,
    hostname: String,
}

impl WorkerServiceBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            hostname: hostname::get()
                .unwrap_or_else(|_| "localhost".into())
                .to_string_lossy()
                .to_string(),
        }
    }

    /// 设置主机名，用于推导上报地址
    pub fn hostname(mut self, hostname: String) -> Self {
        self.hostname = hostname;
        self
    }

    pub fn advertise_address(mut self, address: String) -> Self {
        self.config.advertise_address = Some(address);
        self
    }

    pub fn build(self) -> AnalyzerResult<WorkerService> {
        self.config
            .validate()
            .map_err(|e| AnalyzerError::Configuration(format!("{e:#}")))?;

        let http_client = reqwest::Client::builder()
            .timeout(self.config.request_timeout())
            .build()
            .map_err(|e| AnalyzerError::Network(format!("创建HTTP客户端失败: {e}")))?;

        Ok(WorkerService {
            processor: Arc::new(ChunkProcessor::new(self.config.read_buffer_bytes)),
            config: self.config,
            hostname: self.hostname,
            http_client,
            client: RwLock::new(None),
            shutdown_tx: RwLock::new(None),
            heartbeat_task: RwLock::new(None),
            server_task: RwLock::new(None),
            local_addr: RwLock::new(None),
        })
    }
}

/// Worker服务：HTTP服务器、向协调器注册和心跳
pub struct WorkerService {
    config: WorkerConfig,
    hostname: String,
    processor: Arc<ChunkProcessor>,
    http_client: reqwest::Client,
    client: RwLock<Option<Arc<CoordinatorClient>>>,
    shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
    heartbeat_task: RwLock<Option<JoinHandle<()>>>,
    server_task: RwLock<Option<JoinHandle<()>>>,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl WorkerService {
    pub fn builder(config: WorkerConfig) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(config)
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// 监听端口、注册并开始心跳
    ///
    /// 绑定或首次注册失败时返回错误，已启动的部分会被停止。
    pub async fn start(&self) -> AnalyzerResult<()> {
        if self.shutdown_tx.read().await.is_some() {
            return Err(AnalyzerError::Internal("Worker服务已在运行".to_string()));
        }

        let listener = TcpListener::bind(&self.config.listen_address)
            .await
            .map_err(|e| AnalyzerError::Network(format!("绑定地址 {} 失败: {e}", self.config.listen_address)))?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.write().await = Some(local_addr);

        let address = self.advertised_address(local_addr);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let state = WorkerState::new(self.config.worker_id.clone(), self.processor.clone());
        let app = create_worker_routes(state);
        let mut server_shutdown = shutdown_tx.subscribe();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                error!("Worker HTTP服务异常退出: {}", e);
            }
        });
        info!(worker_id = %self.config.worker_id, "Worker HTTP服务监听于 {}", local_addr);

        let client = Arc::new(CoordinatorClient::new(
            self.config.coordinator_url.clone(),
            self.config.worker_id.clone(),
            address,
            self.http_client.clone(),
        ));
        if let Err(e) = client.register().await {
            let _ = shutdown_tx.send(());
            let _ = server.await;
            return Err(e);
        }

        let heartbeat = HeartbeatManager::new(self.config.heartbeat_interval(), client.clone())
            .start_heartbeat_task(shutdown_tx.subscribe());

        *self.client.write().await = Some(client);
        *self.heartbeat_task.write().await = Some(heartbeat);
        *self.server_task.write().await = Some(server);
        *self.shutdown_tx.write().await = Some(shutdown_tx);

        info!(worker_id = %self.config.worker_id, "Worker服务启动完成");
        Ok(())
    }

    /// 停止心跳、注销并等待HTTP服务排空
    pub async fn stop(&self) -> AnalyzerResult<()> {
        let Some(shutdown_tx) = self.shutdown_tx.write().await.take() else {
            return Ok(());
        };
        info!(worker_id = %self.config.worker_id, "停止Worker服务");

        let _ = shutdown_tx.send(());

        // 心跳停止后再注销，避免注销后又被心跳刷新
        if let Some(heartbeat) = self.heartbeat_task.write().await.take() {
            if let Err(e) = heartbeat.await {
                warn!("等待心跳任务结束失败: {}", e);
            }
        }

        if let Some(client) = self.client.write().await.take() {
            if let Err(e) = client.unregister().await {
                warn!("注销Worker失败: {}", e);
            }
        }

        if let Some(server) = self.server_task.write().await.take() {
            if let Err(e) = server.await {
                warn!("等待HTTP服务结束失败: {}", e);
            }
        }

        info!(worker_id = %self.config.worker_id, "Worker服务已停止");
        Ok(())
    }

    /// 上报给协调器的地址：配置优先，否则为 `http://<hostname>:<port>`
    fn advertised_address(&self, local_addr: SocketAddr) -> String {
        match &self.config.advertise_address {
            Some(address) => address.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.hostname, local_addr.port()),
        }
    }
}
