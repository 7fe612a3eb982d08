use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use analyzer_api::create_app;
use analyzer_core::AppConfig;
use analyzer_dispatcher::{
    HealthMonitor, HealthMonitorService, HttpWorkerTransport, JobController, WorkerRegistry,
};
use analyzer_worker::WorkerService;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

use crate::common::CliError;

/// 协调器连接Worker的超时
const WORKER_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Coordinator,
    Worker,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Self {
        info!("初始化应用程序，模式: {:?}", mode);
        Self { config, mode }
    }

    /// 运行应用程序直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        match self.mode {
            AppMode::Coordinator => self.run_coordinator(shutdown_rx).await,
            AppMode::Worker => self.run_worker(shutdown_rx).await,
        }
    }

    async fn run_coordinator(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let metrics_handle = if self.config.observability.metrics_enabled {
            Some(install_metrics_recorder()?)
        } else {
            None
        };

        let server = CoordinatorServer::bind(&self.config, metrics_handle).await?;
        server.serve(shutdown_rx).await
    }

    async fn run_worker(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动Worker服务: {}", self.config.worker.worker_id);

        let worker_service = WorkerService::builder(self.config.worker.clone())
            .build()
            .context("创建Worker服务失败")?;

        worker_service
            .start()
            .await
            .map_err(|e| CliError::Startup(e.to_string()))?;

        let _ = shutdown_rx.recv().await;
        info!("Worker收到关闭信号");

        worker_service.stop().await?;
        info!("Worker服务已停止");
        Ok(())
    }
}

/// 安装全局Prometheus记录器
pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("安装Prometheus指标记录器失败")
}

/// 已绑定端口、尚未开始服务的协调器
pub struct CoordinatorServer {
    listener: TcpListener,
    app: Router,
    health_monitor: Arc<HealthMonitor>,
}

impl CoordinatorServer {
    /// 组装注册表、健康检测、作业控制器和HTTP路由，并绑定监听地址
    pub async fn bind(config: &AppConfig, metrics_handle: Option<PrometheusHandle>) -> Result<Self> {
        let registry = Arc::new(WorkerRegistry::new());
        let health_monitor = Arc::new(HealthMonitor::new(registry.clone(), config.health.clone()));
        let transport = Arc::new(
            HttpWorkerTransport::new(WORKER_CONNECT_TIMEOUT).context("创建Worker传输失败")?,
        );
        let job_controller = Arc::new(JobController::new(
            config.coordinator.clone(),
            registry,
            transport,
        ));

        let app = create_app(
            job_controller,
            metrics_handle,
            &config.observability.metrics_endpoint,
        );

        let address = &config.coordinator.listen_address;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| CliError::Startup(format!("绑定地址 {address} 失败: {e}")))?;

        Ok(Self {
            listener,
            app,
            health_monitor,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("获取监听地址失败")
    }

    /// 启动健康检测并提供HTTP服务，收到关闭信号后排空请求
    pub async fn serve(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let local_addr = self.local_addr()?;

        let monitor = self.health_monitor.clone();
        let monitor_handle = tokio::spawn(async move {
            if let Err(e) = monitor.start_monitoring().await {
                error!("健康检测异常退出: {}", e);
            }
        });

        info!("协调器启动在 http://{}", local_addr);

        let result = axum::serve(self.listener, self.app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("协调器收到关闭信号");
            })
            .await;

        self.health_monitor.stop_monitoring().await?;
        monitor_handle.abort();

        result.context("协调器HTTP服务异常退出")?;
        info!("协调器已停止");
        Ok(())
    }
}
